//! Request builders.

use core::fmt::{self, Write};
use core::net::SocketAddrV4;

use crate::app::ports::Bank;
use crate::config::{FotaConfig, FIRMWARE_VERSION};

/// Capacity of a request buffer.  Large enough for every field at its
/// configured maximum.
pub const REQUEST_CAP: usize = 512;

/// A fully framed request, ready to send.
pub type Request = heapless::String<REQUEST_CAP>;

/// Build the version query sent by the version-check session.
///
/// Fails only if the framed request exceeds [`REQUEST_CAP`].
pub fn version_query(cfg: &FotaConfig, server: SocketAddrV4) -> Result<Request, fmt::Error> {
    let mut req = Request::new();
    write!(req, "GET /firmware/{}/versions HTTP/1.0\r\n", cfg.project)?;
    write_host(&mut req, server)?;
    write_static_headers(&mut req)?;
    write!(
        req,
        "X-Device-Id: {}\r\nX-Device-Token: {}\r\nX-Client: {}\r\nX-Version: {}\r\n\r\n",
        cfg.device_id, cfg.token, cfg.client, cfg.current_version
    )?;
    Ok(req)
}

/// Build the image download request for `bank`.
pub fn firmware_download(bank: Bank, server: SocketAddrV4) -> Result<Request, fmt::Error> {
    let mut req = Request::new();
    write!(req, "GET /{} HTTP/1.0\r\n", bank.image_name())?;
    write_host(&mut req, server)?;
    write_static_headers(&mut req)?;
    req.write_str("\r\n")?;
    Ok(req)
}

fn write_host(req: &mut Request, server: SocketAddrV4) -> fmt::Result {
    if server.port() == 80 {
        write!(req, "Host: {}\r\n", server.ip())
    } else {
        write!(req, "Host: {}:{}\r\n", server.ip(), server.port())
    }
}

fn write_static_headers(req: &mut Request) -> fmt::Result {
    write!(
        req,
        "Connection: close\r\nCache-Control: no-cache\r\nUser-Agent: fota-client/{}\r\nAccept: */*\r\n",
        FIRMWARE_VERSION
    )
}
