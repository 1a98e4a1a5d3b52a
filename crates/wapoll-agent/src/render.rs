//! Pairing code output.

use std::io::{self, Write};

use qrcode::render::unicode::Dense1x2;
use qrcode::{EcLevel, QrCode};
use wapoll_runtime::PairingCode;

/// Presents a pairing code to the user.
pub trait PairingRenderer {
    /// Write `code` to `out`.
    fn render(&self, code: &PairingCode, out: &mut dyn Write) -> io::Result<()>;
}

/// Draws the code as a half-block QR matrix, light-on-dark so it scans from
/// a dark terminal.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalRenderer;

impl TerminalRenderer {
    fn matrix(code: &str) -> io::Result<String> {
        let qr = QrCode::with_error_correction_level(code.as_bytes(), EcLevel::L)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        Ok(qr
            .render::<Dense1x2>()
            .dark_color(Dense1x2::Light)
            .light_color(Dense1x2::Dark)
            .quiet_zone(true)
            .build())
    }
}

impl PairingRenderer for TerminalRenderer {
    fn render(&self, code: &PairingCode, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}", Self::matrix(&code.code)?)?;
        writeln!(
            out,
            "Scan with Linked Devices. Code expires in {}s.",
            code.timeout.as_secs()
        )
    }
}

/// Prints the raw code string.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainRenderer;

impl PairingRenderer for PlainRenderer {
    fn render(&self, code: &PairingCode, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}", code.code)
    }
}
