/// Declare an RPC service.
///
/// ```ignore
/// labrpc::service! {
///     service echo_svc {
///         fn echo(msg: String) -> String;
///     }
/// }
/// ```
///
/// expands to a module `echo_svc` with a `Service` trait to implement, a typed
/// `Client`, a sequential `Server` and a `SharedServer` that handles each
/// request on its own task.
#[macro_export]
macro_rules! service {
    () => {
        compile_error!("empty service is not allowed");
    };
    (
        $(#[$service_attr:meta])*
        service $svc_name:ident {
            $(
                $(#[$method_attr:meta])*
                fn $method_name:ident($($arg_id:ident: $arg_ty:ty),*) -> $output:ty;
            )*
        }
    ) => {
        #[allow(missing_docs)]
        $(#[$service_attr])*
        pub mod $svc_name {
            #[allow(unused_imports)]
            use super::*;

            use std::time::Duration;

            use $crate::network::NetworkPackage;
            use $crate::{server, client};

            use $crate::tokio::sync::mpsc::{self, Sender, Receiver};
            use $crate::serde_json;
            use $crate::serde::{Serialize, Deserialize};
            use $crate::anyhow::{Result, anyhow};
            use $crate::async_trait;
            use $crate::log::{error, trace};


            #[derive(Debug, Deserialize, Serialize)]
            pub enum RpcRequest {
                $(
                    #[allow(non_camel_case_types)]
                    $method_name {  $($arg_id : $arg_ty),* }
                ),*
            }

            mod rpc_response {
                use super::*;
                $(
                    #[derive(Deserialize, Serialize)]
                    #[allow(non_camel_case_types)]
                    pub struct $method_name {
                        pub data: $output
                    }
                )*
            }

            #[async_trait]
            pub trait Service: Send + 'static {
                $(
                    $(#[$method_attr])*
                    async fn $method_name(&mut self, $($arg_id : $arg_ty),* ) -> Result<$output>;
                )*
            }

            #[derive(Debug, Clone)]
            pub struct Client {
                server_id: String,
                tx: Sender<NetworkPackage>,
                timeout: Duration,
            }

            impl Client {

                $(
                    pub async fn $method_name(&self, $($arg_id : $arg_ty),* ) -> Result<$output> {
                        let req = RpcRequest::$method_name {
                            $($arg_id),*
                        };
                        let resp = self.call(serde_json::to_string(&req)?).await?;
                        let resp: rpc_response::$method_name = serde_json::from_str(&resp)?;
                        Ok(resp.data)
                    }
                )*

                pub fn with_timeout(mut self, timeout: Duration) -> Self {
                    self.timeout = timeout;
                    self
                }

                pub fn server_id(&self) -> &str {
                    &self.server_id
                }

                pub async fn call(&self, req: String) -> Result<String> {
                    let (tx, mut rx) = mpsc::channel(1);
                    self.tx.send(NetworkPackage{to: self.server_id.clone(), reply: tx, data: req.clone()}).await?;
                    match $crate::tokio::time::timeout(self.timeout, rx.recv()).await {
                        Ok(Some(resp)) => {
                            trace!("req: {}, resp: {}", req, &resp);
                            Ok(resp)
                        }
                        Ok(None) => Err(anyhow!("{} unreachable", self.server_id)),
                        Err(_) => Err(anyhow!("{} timed out after {:?}", self.server_id, self.timeout)),
                    }
                }
            }

            impl client::Client for Client {
                fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self {
                    Self {
                        server_id,
                        tx: net_tx,
                        timeout: client::DEFAULT_TIMEOUT,
                    }
                }
            }

            async fn dispatch<T: Service>(svc: &mut T, package: NetworkPackage) -> Result<()> {
                let NetworkPackage { reply, data, .. } = package;
                trace!("handle recv: {}", &data);
                let req: RpcRequest = serde_json::from_str(&data)?;
                let resp = match req {
                    $(
                        RpcRequest::$method_name { $($arg_id),* } => {
                            let data = svc.$method_name($($arg_id),* ).await?;
                            serde_json::to_string(&rpc_response::$method_name { data })?
                        }
                    )*
                };
                trace!("handle send: {}", &resp);
                if reply.send(resp).await.is_err() {
                    trace!("caller went away before the reply");
                }
                Ok(())
            }

            #[derive(Debug)]
            pub struct Server<T: Service> {
                svc: T,
                tx: Sender<NetworkPackage>,
                rx: Receiver<NetworkPackage>,
            }

            #[async_trait]
            impl<T: Service> server::Server for Server<T> {
                type Service = T;

                fn from_service(svc: Self::Service) -> Self {
                    let (tx, rx) = mpsc::channel(100);
                    Self {svc, tx, rx}
                }

                fn client_chan(&self) -> Sender<NetworkPackage> {
                    self.tx.clone()
                }

                async fn recv(&mut self) -> Option<NetworkPackage> {
                    self.rx.recv().await
                }

                async fn handle(&mut self, package: NetworkPackage) -> Result<()> {
                    dispatch(&mut self.svc, package).await
                }
            }

            #[derive(Debug)]
            pub struct SharedServer<T: Service + Clone> {
                svc: T,
                tx: Sender<NetworkPackage>,
                rx: Receiver<NetworkPackage>,
            }

            #[async_trait]
            impl<T: Service + Clone> server::Server for SharedServer<T> {
                type Service = T;

                fn from_service(svc: Self::Service) -> Self {
                    let (tx, rx) = mpsc::channel(100);
                    Self {svc, tx, rx}
                }

                fn client_chan(&self) -> Sender<NetworkPackage> {
                    self.tx.clone()
                }

                async fn recv(&mut self) -> Option<NetworkPackage> {
                    self.rx.recv().await
                }

                async fn handle(&mut self, package: NetworkPackage) -> Result<()> {
                    let mut svc = self.svc.clone();
                    $crate::tokio::spawn(async move {
                        if let Err(e) = dispatch(&mut svc, package).await {
                            error!("server error: {}", e);
                        }
                    });
                    Ok(())
                }
            }
        }
    };
}
