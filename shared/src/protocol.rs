/// SSDP multicast group and port
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";
pub const SSDP_PORT: u16 = 1900;

/// Search target that matches every non-silent local registration
pub const SSDP_ALL: &str = "ssdp:all";

/// Request verbs understood on the discovery channel
pub const METHOD_SEARCH: &str = "M-SEARCH";
pub const METHOD_NOTIFY: &str = "NOTIFY";

/// NTS markers for announcements
pub const NTS_ALIVE: &str = "ssdp:alive";
pub const NTS_BYEBYE: &str = "ssdp:byebye";

pub const DEFAULT_SERVER_ID: &str = "Smart Camera Server";
pub const DEFAULT_CACHE_CONTROL: &str = "max-age=1800";

/// Device and service types advertised by the camera
pub const DEVICE_TYPE: &str = "urn:schemas-upnp-org:device:SmartCamera:1";
pub const SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:PresenceSensor:1";

/// HTTP control surface
pub const METHOD_SUBSCRIBE: &str = "SUBSCRIBE";
pub const HEADER_PSK: &str = "x-auth-psk";
pub const HEADER_CALLBACK: &str = "callback";
pub const HEADER_TIMEOUT: &str = "timeout";
pub const TIMEOUT_PREFIX: &str = "Second-";
pub const STATUS_QUERY_METHOD: &str = "getStatus";

/// Status strings produced by the motion pipeline
pub const STATUS_MOTION: &str = "Motion";
pub const STATUS_NO_MOTION: &str = "No motion";
