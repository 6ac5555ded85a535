pub mod create_location_request;
pub mod gateway_error;
pub mod location_gateway;

pub use create_location_request::{CreateLocationBody, CreateLocationRequest};
pub use gateway_error::{GatewayError, ValidationErrors};
pub use location_gateway::{HttpLocationGateway, LocationGateway, DEFAULT_API_BASE_URL};
