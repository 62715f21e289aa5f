use std::time::Duration;

use tokio::sync::mpsc::Sender;

use crate::network::NetworkPackage;

/// Per-call deadline used by generated clients unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

pub trait Client {
    fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self;
}
