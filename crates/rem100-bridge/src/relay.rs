//! Network bridge entry point

use std::net::TcpListener;
use std::sync::atomic::AtomicBool;

use rem100_core::device::{CommandTransport, Emulator};

use crate::error::{BridgeError, Result};
use crate::link::{PeerLink, TcpLink};
use crate::session::{check_image, NetworkSession};

/// Run a session with an already connected peer
///
/// Returns the mirror once `stop` is set. Any error ends the session.
pub fn serve<T: CommandTransport, L: PeerLink>(
    device: &mut Emulator<T>,
    link: L,
    image: Vec<u8>,
    stop: &AtomicBool,
) -> Result<Vec<u8>> {
    let mut session = NetworkSession::new(device, link, image)?;
    session.start()?;
    session.run_until(stop)?;
    Ok(session.into_mirror())
}

/// Accept one connection on `listener` and serve it
pub fn serve_listener<T: CommandTransport>(
    device: &mut Emulator<T>,
    listener: &TcpListener,
    image: Vec<u8>,
    stop: &AtomicBool,
) -> Result<Vec<u8>> {
    check_image(&image)?;
    let link = TcpLink::accept_from(listener, stop)?;
    let mirror = serve(device, link, image, stop)?;
    log::info!("Connection closed");
    Ok(mirror)
}

/// Bridge the appliance to one TCP peer on `port`
///
/// Returns the process exit status: 0 when stopped by the user, 1 when
/// the session failed. The appliance is left running either way.
pub fn start_network_bridge<T: CommandTransport>(
    device: &mut Emulator<T>,
    port: u16,
    image: Vec<u8>,
    stop: &AtomicBool,
) -> i32 {
    let result = check_image(&image)
        .and_then(|()| Ok(TcpListener::bind(("0.0.0.0", port))?))
        .and_then(|listener| serve_listener(device, &listener, image, stop));

    match result {
        Ok(_) | Err(BridgeError::Interrupted) => 0,
        Err(e) => {
            log::error!("Network I/O loop failed: {}", e);
            if let Err(e) = device.resume_emulation() {
                log::warn!("Could not resume emulation: {}", e);
            }
            1
        }
    }
}
