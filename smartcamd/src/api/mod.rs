pub mod descriptor;
pub mod routes;
