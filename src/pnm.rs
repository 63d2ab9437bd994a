//! Minimal raw PNM writer: the collaborator boundary `write_next_frame`
//! hands a decoded [`Image`] off to (spec.md §1, §6). Not a general
//! PNM/PPM library — only raw (binary) P5/P6 output, 8-bit samples,
//! saturating the `(v-128)*16` representation back to `[0,255]`.

use std::io::Write;

use crate::error::{Error, Result};
use crate::image::Image;

/// Writes `image` as a raw PGM (`P5`, grayscale) or PPM (`P6`, color)
/// file to `out`, depending on [`Image::color`].
pub fn write_pnm<W: Write>(out: &mut W, image: &Image) -> Result<()> {
    let magic = if image.color { "P6" } else { "P5" };
    let maxval = 255;
    write!(out, "{magic}\n{} {}\n{maxval}\n", image.width, image.height)
        .map_err(|e| Error::io("pnm", e))?;

    let rgb = image.to_rgb8()?;
    if image.color {
        out.write_all(&rgb).map_err(|e| Error::io("pnm", e))?;
    } else {
        // `to_rgb8` replicates the gray sample into all three channels;
        // a P5 file wants one byte per pixel back out.
        let gray: Vec<u8> = rgb.iter().step_by(3).copied().collect();
        out.write_all(&gray).map_err(|e| Error::io("pnm", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_image_writes_a_p5_header_and_one_byte_per_pixel() {
        let img = Image::alloc_gray(4, 2);
        let mut buf = Vec::new();
        write_pnm(&mut buf, &img).unwrap();
        let header_end = buf.iter().position(|&b| b == b'\n').unwrap();
        assert_eq!(&buf[..header_end], b"P5");
        assert_eq!(buf.len() - (b"P5\n4 2\n255\n".len()), 8);
    }

    #[test]
    fn color_image_writes_a_p6_header_and_three_bytes_per_pixel() {
        let img = Image::alloc_color(4, 2, crate::image::ChromaFormat::Yuv444);
        let mut buf = Vec::new();
        write_pnm(&mut buf, &img).unwrap();
        assert!(buf.starts_with(b"P6\n4 2\n255\n"));
        assert_eq!(buf.len() - b"P6\n4 2\n255\n".len(), 4 * 2 * 3);
    }
}
