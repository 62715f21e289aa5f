use crate::network::NetworkPackage;
use anyhow::Result;
use log::error;
use tokio::sync::mpsc::Sender;

#[async_trait::async_trait]
pub trait Server {
    type Service;
    fn from_service(svc: Self::Service) -> Self;
    fn client_chan(&self) -> Sender<NetworkPackage>;
    async fn recv(&mut self) -> Option<NetworkPackage>;
    async fn handle(&mut self, package: NetworkPackage) -> Result<()>;
    async fn run(&mut self) {
        while let Some(package) = self.recv().await {
            if let Err(e) = self.handle(package).await {
                error!("server error: {}", e);
            }
        }
    }
}
