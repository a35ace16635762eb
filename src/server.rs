use std::sync::Arc;

use log::{error, info};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::config::TunnelConfig;
use crate::tunnel::Dispatcher;

/// Binds the tunnel's UDP socket and spawns its dispatcher.
///
/// Binding happens before returning, so a bad bind location fails startup.
pub async fn start_tunnel_server(config: TunnelConfig) -> std::io::Result<JoinHandle<()>> {
    let socket = UdpSocket::bind(config.bind_location).await?;
    let local_addr = socket.local_addr()?;
    info!(
        "Tunnel server for {} listening on {}",
        config.domain, local_addr
    );

    let dispatcher = Dispatcher::new(Arc::new(config), Arc::new(socket));
    Ok(tokio::spawn(async move {
        if let Err(e) = dispatcher.run().await {
            error!("Tunnel server on {local_addr} stopped: {e}");
        }
    }))
}

/// Starts every tunnel server, aborting the ones already started if any fails.
pub async fn start_tunnel_servers(
    configs: Vec<TunnelConfig>,
) -> std::io::Result<Vec<JoinHandle<()>>> {
    let mut join_handles = Vec::with_capacity(configs.len());
    for config in configs {
        let bind_location = config.bind_location;
        match start_tunnel_server(config).await {
            Ok(handle) => join_handles.push(handle),
            Err(e) => {
                for join_handle in join_handles {
                    join_handle.abort();
                }
                return Err(std::io::Error::new(
                    e.kind(),
                    format!("failed to start server at {bind_location}: {e}"),
                ));
            }
        }
    }
    Ok(join_handles)
}
