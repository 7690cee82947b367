pub mod extract_request;
pub mod extract_route;
