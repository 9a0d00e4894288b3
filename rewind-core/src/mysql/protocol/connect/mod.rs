mod auth_more_data;
mod auth_switch;
mod handshake;
mod handshake_response;
mod ssl_request;

pub use auth_more_data::AuthMoreData;
pub use auth_switch::AuthSwitchRequest;
pub use handshake::Handshake;
pub use handshake_response::HandshakeResponse;
pub use ssl_request::SslRequest;
