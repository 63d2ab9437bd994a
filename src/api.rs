//! Public decoder surface (spec.md §6 "Decoder public operations").
//!
//! Grounded in `codec/dfiasco.c`'s `fiasco_decoder_new`/`fiasco_get_frame`
//! pair: open validates and loads the stream + basis once, then each call
//! advances the sequencer by exactly one displayed frame.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::container::ContainerReader;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::motion::ChromaClip;
use crate::options::DecoderOptions;
use crate::pnm::write_pnm;
use crate::sequencer::Sequencer;
use crate::wfa::Wfa;

/// A single open FIASCO video/image stream, positioned at its next
/// undisplayed frame.
///
/// Mirrors `fiasco_decoder_t` in shape: the container (header + basis +
/// bitstream cursor), a reusable working `Wfa`, the sequencer's reference
/// slots, and the output options chosen at open time.
pub struct Decoder {
    container: ContainerReader,
    wfa: Wfa,
    sequencer: Sequencer,
    options: DecoderOptions,
    clip: ChromaClip,
    last_frame: Option<Rc<Image>>,
}

impl Decoder {
    /// Opens `path`, reading the stream header, then loading its initial
    /// basis file from a sibling path with the same name the header
    /// records (`codec/dfiasco.c`'s `read_basis(wfa->wfainfo->basis_name,
    /// wfa)`, resolved here relative to `path`'s directory since the
    /// format carries no absolute basis location).
    pub fn open(path: impl AsRef<Path>, options: DecoderOptions) -> Result<Decoder> {
        let path = path.as_ref();
        let stream_bytes = fs::read(path).map_err(|e| Error::io(path.display().to_string(), e))?;

        // Parse just far enough to learn the basis filename before we
        // know whether we can load it; `ContainerReader::open` wants the
        // basis bytes up front, so we read the header through a throwaway
        // cursor first.
        let basis_name = peek_basis_name(&stream_bytes)?;
        let basis_path = basis_path_for(path, &basis_name);
        let basis_bytes =
            fs::read(&basis_path).map_err(|e| Error::io(basis_path.display().to_string(), e))?;

        let container = ContainerReader::open(stream_bytes, &basis_bytes)?;
        let (width, height) = options.scaled_dimensions(container.info.width, container.info.height);
        log::debug!(
            "opened {}: {}x{} (scaled {}x{}), {} frames, color={}",
            path.display(),
            container.info.width,
            container.info.height,
            width,
            height,
            container.info.frames,
            container.info.color
        );

        Ok(Decoder {
            container,
            wfa: Wfa::empty(),
            sequencer: Sequencer::new(),
            options,
            clip: ChromaClip::new(),
            last_frame: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.options
            .scaled_dimensions(self.container.info.width, self.container.info.height)
            .0
    }

    pub fn height(&self) -> u32 {
        self.options
            .scaled_dimensions(self.container.info.width, self.container.info.height)
            .1
    }

    pub fn is_color(&self) -> bool {
        self.container.info.color
    }

    /// Number of frames in the stream (spec.md §6: `length()`).
    pub fn length(&self) -> u32 {
        self.container.info.frames
    }

    pub fn rate(&self) -> f64 {
        self.container.info.fps
    }

    pub fn title(&self) -> &str {
        &self.container.info.title
    }

    pub fn comment(&self) -> &str {
        &self.container.info.comment
    }

    /// Decodes and returns the next frame in display order, or `None`
    /// once every frame has been delivered (spec.md §8 property 6).
    pub fn next_frame(&mut self) -> Result<Option<Rc<Image>>> {
        let frame = self
            .sequencer
            .next_frame(&mut self.container, &mut self.wfa, &self.options, &self.clip)?;
        if let Some(ref image) = frame {
            self.last_frame = Some(Rc::clone(image));
        }
        Ok(frame)
    }

    /// Advances to the next frame (if one hasn't already been pulled via
    /// [`Decoder::next_frame`]) and writes it as a raw PNM to `path`.
    pub fn write_next_frame(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let image = match self.last_frame.take() {
            Some(image) => image,
            None => self
                .next_frame()?
                .ok_or_else(|| Error::malformed("api", "no frame left to write"))?,
        };
        let mut file = fs::File::create(path).map_err(|e| Error::io(path.display().to_string(), e))?;
        write_pnm(&mut file, &image)
    }

    /// Releases the stream. Present for parity with spec.md §6's explicit
    /// `close()` operation; dropping the `Decoder` does the same thing,
    /// since every resource it owns is plain Rust-owned memory.
    pub fn close(self) {}
}

fn peek_basis_name(stream_bytes: &[u8]) -> Result<String> {
    let mut reader = crate::bitio::BitReader::new(stream_bytes);
    let (_, basis_name) = crate::container::WfaInfo::basis_name_and_info(&mut reader)?;
    Ok(basis_name)
}

fn basis_path_for(stream_path: &Path, basis_name: &str) -> PathBuf {
    match stream_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(basis_name),
        _ => PathBuf::from(basis_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basis_path_resolves_next_to_the_stream_file() {
        let stream = Path::new("/videos/clip.fia");
        assert_eq!(basis_path_for(stream, "small.fco"), PathBuf::from("/videos/small.fco"));
    }

    #[test]
    fn basis_path_falls_back_to_bare_name_with_no_parent() {
        let stream = Path::new("clip.fia");
        assert_eq!(basis_path_for(stream, "small.fco"), PathBuf::from("small.fco"));
    }
}
