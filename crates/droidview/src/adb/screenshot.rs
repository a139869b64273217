//! Framebuffer capture over the ADB transport
//!
//! The `framebuffer:` device service replies with a fixed-size little-endian
//! header describing the pixel format, followed by exactly `size` bytes of
//! raw pixels. The channel ordering is derived from the reported channel
//! offsets, with a 16-bit-per-pixel special case.

use crate::adb::device::AdbDevice;
use crate::error::{DroidError, Result};
use base64::{engine::general_purpose, Engine as _};
use image::{Rgba, RgbaImage};
use std::fmt;
use std::io::Cursor;
use tracing::debug;

/// Framebuffer service header, little-endian u32 fields in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferHeader {
    pub version: u32,
    pub bpp: u32,
    pub size: u32,
    pub width: u32,
    pub height: u32,
    pub red_offset: u32,
    pub red_length: u32,
    pub blue_offset: u32,
    pub blue_length: u32,
    pub green_offset: u32,
    pub green_length: u32,
    pub alpha_offset: u32,
    pub alpha_length: u32,
}

/// Pixel channel ordering of a framebuffer payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgba,
    Rgbx,
    Bgra,
    Rgb565,
}

impl ChannelOrder {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ChannelOrder::Rgb565 => 2,
            _ => 4,
        }
    }
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelOrder::Rgba => write!(f, "RGBA"),
            ChannelOrder::Rgbx => write!(f, "RGBX"),
            ChannelOrder::Bgra => write!(f, "BGRA"),
            ChannelOrder::Rgb565 => write!(f, "RGB, 16-bit"),
        }
    }
}

impl FramebufferHeader {
    pub const WIRE_SIZE: usize = 52;

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::WIRE_SIZE {
            return Err(DroidError::Protocol(format!(
                "framebuffer header truncated: {} bytes",
                buf.len()
            )));
        }
        let field = |i: usize| {
            let start = i * 4;
            u32::from_le_bytes([buf[start], buf[start + 1], buf[start + 2], buf[start + 3]])
        };
        Ok(Self {
            version: field(0),
            bpp: field(1),
            size: field(2),
            width: field(3),
            height: field(4),
            red_offset: field(5),
            red_length: field(6),
            blue_offset: field(7),
            blue_length: field(8),
            green_offset: field(9),
            green_length: field(10),
            alpha_offset: field(11),
            alpha_length: field(12),
        })
    }

    /// Channel ordering implied by the header. 16 bits per pixel always
    /// means packed RGB565, whatever the offsets claim.
    pub fn channel_order(&self) -> ChannelOrder {
        if self.bpp == 16 {
            return ChannelOrder::Rgb565;
        }
        if self.blue_offset == 0 {
            ChannelOrder::Bgra
        } else if self.alpha_length == 0 {
            ChannelOrder::Rgbx
        } else {
            ChannelOrder::Rgba
        }
    }
}

fn decode_pixels(header: &FramebufferHeader, data: &[u8]) -> Result<RgbaImage> {
    let order = header.channel_order();
    let expected = header.width as usize * header.height as usize * order.bytes_per_pixel();
    if data.len() < expected {
        return Err(DroidError::Protocol(format!(
            "framebuffer payload truncated: {} of {} bytes",
            data.len(),
            expected
        )));
    }
    let mut image = RgbaImage::new(header.width, header.height);
    for (i, pixel) in image.pixels_mut().enumerate() {
        *pixel = match order {
            ChannelOrder::Rgba => {
                let p = &data[i * 4..i * 4 + 4];
                Rgba([p[0], p[1], p[2], p[3]])
            }
            ChannelOrder::Rgbx => {
                let p = &data[i * 4..i * 4 + 4];
                Rgba([p[0], p[1], p[2], 0xff])
            }
            ChannelOrder::Bgra => {
                let p = &data[i * 4..i * 4 + 4];
                Rgba([p[2], p[1], p[0], p[3]])
            }
            ChannelOrder::Rgb565 => {
                let v = u16::from_le_bytes([data[i * 2], data[i * 2 + 1]]);
                let r = ((v >> 11) & 0x1f) as u8;
                let g = ((v >> 5) & 0x3f) as u8;
                let b = (v & 0x1f) as u8;
                Rgba([r << 3 | r >> 2, g << 2 | g >> 4, b << 3 | b >> 2, 0xff])
            }
        };
    }
    Ok(image)
}

/// A captured framebuffer frame
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub image: RgbaImage,
}

impl Screenshot {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode the frame as a base64 PNG string.
    pub fn to_base64_png(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        self.image
            .write_to(&mut cursor, image::ImageFormat::Png)
            .map_err(DroidError::Image)?;
        Ok(general_purpose::STANDARD.encode(&buffer))
    }
}

/// Capture one frame through the framebuffer service.
///
/// The read consumes the transport socket; `reconnect` controls whether the
/// connection is reestablished afterwards.
pub fn take_snapshot(device: &mut AdbDevice, reconnect: bool) -> Result<Screenshot> {
    let conn = device.connection_mut();
    conn.start_service("framebuffer:")?;
    let header_bytes = conn.read_exact_raw(FramebufferHeader::WIRE_SIZE)?;
    let header = FramebufferHeader::parse(&header_bytes)?;
    debug!(
        width = header.width,
        height = header.height,
        bpp = header.bpp,
        order = %header.channel_order(),
        "framebuffer frame"
    );
    let data = conn.read_exact_raw(header.size as usize)?;
    conn.mark_consumed();
    if reconnect {
        conn.reconnect()?;
    }
    let image = decode_pixels(&header, &data)?;
    Ok(Screenshot { image })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(fields: [u32; 13]) -> Vec<u8> {
        fields.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn rgba_header(width: u32, height: u32) -> FramebufferHeader {
        FramebufferHeader {
            version: 1,
            bpp: 32,
            size: width * height * 4,
            width,
            height,
            red_offset: 0,
            red_length: 8,
            blue_offset: 16,
            blue_length: 8,
            green_offset: 8,
            green_length: 8,
            alpha_offset: 24,
            alpha_length: 8,
        }
    }

    #[test]
    fn test_header_parse_wire_order() {
        let bytes = header_bytes([1, 32, 16, 2, 2, 0, 8, 16, 8, 8, 8, 24, 8]);
        let header = FramebufferHeader::parse(&bytes).unwrap();
        assert_eq!(header.version, 1);
        assert_eq!(header.bpp, 32);
        assert_eq!(header.width, 2);
        assert_eq!(header.height, 2);
        assert_eq!(header.blue_offset, 16);
        assert_eq!(header.alpha_offset, 24);
    }

    #[test]
    fn test_header_truncated() {
        let err = FramebufferHeader::parse(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, DroidError::Protocol(_)));
    }

    #[test]
    fn test_channel_order_from_offsets() {
        let mut header = rgba_header(1, 1);
        assert_eq!(header.channel_order(), ChannelOrder::Rgba);
        header.alpha_length = 0;
        assert_eq!(header.channel_order(), ChannelOrder::Rgbx);
        header.blue_offset = 0;
        header.red_offset = 16;
        assert_eq!(header.channel_order(), ChannelOrder::Bgra);
    }

    #[test]
    fn test_16_bpp_forces_rgb565_regardless_of_offsets() {
        let mut header = rgba_header(1, 1);
        header.bpp = 16;
        // offsets still describe a 32-bit layout; they must be ignored
        assert_eq!(header.channel_order(), ChannelOrder::Rgb565);
        assert_eq!(header.channel_order().to_string(), "RGB, 16-bit");
    }

    #[test]
    fn test_decode_rgba() {
        let header = rgba_header(2, 1);
        let data = vec![10, 20, 30, 255, 40, 50, 60, 128];
        let image = decode_pixels(&header, &data).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
        assert_eq!(image.get_pixel(1, 0), &Rgba([40, 50, 60, 128]));
    }

    #[test]
    fn test_decode_bgra_swaps_channels() {
        let mut header = rgba_header(1, 1);
        header.blue_offset = 0;
        header.red_offset = 16;
        let data = vec![30, 20, 10, 255];
        let image = decode_pixels(&header, &data).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_decode_rgb565() {
        let mut header = rgba_header(1, 1);
        header.bpp = 16;
        header.size = 2;
        // pure red: r=31, g=0, b=0 -> 0xF800
        let data = 0xf800u16.to_le_bytes().to_vec();
        let image = decode_pixels(&header, &data).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let header = rgba_header(2, 2);
        let err = decode_pixels(&header, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, DroidError::Protocol(_)));
    }
}
