mod api_client;
mod transport;

pub use api_client::ApiClient;
pub use transport::Transport;
