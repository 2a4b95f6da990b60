use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

/// Ask the OS for an unused loopback TCP port.
///
/// The probe socket is dropped before returning, so another process could
/// in principle grab the port before the caller binds it.
pub fn allocate_ephemeral_port() -> io::Result<u16> {
    let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}
