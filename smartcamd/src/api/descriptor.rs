use shared::protocol::{DEVICE_TYPE, SERVICE_TYPE};

/// Render the UPnP device description served at the descriptor path
pub fn render(device_uuid: &str, friendly_name: &str, presentation_url: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
    <specVersion>
        <major>1</major>
        <minor>0</minor>
    </specVersion>
    <device>
        <deviceType>{device_type}</deviceType>
        <friendlyName>{friendly_name}</friendlyName>
        <manufacturer>Sanfe75</manufacturer>
        <manufacturerURL>https://github.com/Sanfe75</manufacturerURL>
        <modelDescription>SmartCamera Computer Based Camera</modelDescription>
        <modelName>SmartCamera 01</modelName>
        <modelNumber>SC01</modelNumber>
        <modelURL>https://github.com/Sanfe75/SmartCamera</modelURL>
        <serialNumber>{version}</serialNumber>
        <UDN>uuid:{uuid}</UDN>
        <serviceList>
            <service>
                <serviceType>{service_type}</serviceType>
            </service>
        </serviceList>
        <presentationURL>{presentation_url}</presentationURL>
    </device>
</root>
"#,
        device_type = DEVICE_TYPE,
        service_type = SERVICE_TYPE,
        friendly_name = escape(friendly_name),
        version = env!("CARGO_PKG_VERSION"),
        uuid = escape(device_uuid),
        presentation_url = escape(presentation_url),
    )
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_uuid_and_presentation_url() {
        let xml = render("0b7f4b0e-2f61", "SmartCamera", "http://10.0.0.2/");

        assert!(xml.starts_with("<?xml version=\"1.0\"?>"));
        assert!(xml.contains("<UDN>uuid:0b7f4b0e-2f61</UDN>"));
        assert!(xml.contains("<presentationURL>http://10.0.0.2/</presentationURL>"));
        assert!(xml.contains(&format!("<deviceType>{}</deviceType>", DEVICE_TYPE)));
    }

    #[test]
    fn test_escapes_markup() {
        let xml = render("abc", "Garage & <Drive>", "http://x/?a=1&b=2");

        assert!(xml.contains("<friendlyName>Garage &amp; &lt;Drive&gt;</friendlyName>"));
        assert!(xml.contains("http://x/?a=1&amp;b=2"));
    }
}
