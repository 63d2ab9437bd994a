//! Frame sequencer (component K): I/P/B reference-frame bookkeeping and
//! display-order delivery.
//!
//! Grounded in `codec/decoder.c`'s `get_next_frame` and `alloc_video`, and
//! `codec/dfiasco.c`'s `video_t` lifecycle. The original keeps a single
//! `video->frame` local variable alive *across* loop iterations to carry a
//! just-decoded-but-not-yet-displayable frame forward until the B-frame
//! branch that consumes it as a future reference; this port makes that
//! explicit as `pending`/`pending_smoothed` fields instead of relying on
//! a loop-scoped C local that outlives its block.

use std::rc::Rc;

use crate::container::ContainerReader;
use crate::decoder::decode_image;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::motion::{restore_mc, ChromaClip};
use crate::options::DecoderOptions;
use crate::smoothing::smooth_image;
use crate::wfa::{FrameType, Wfa};

/// Tracks `past`/`future`/`frame` (plus smoothed clones) across calls, the
/// way `video_t` does in the original (spec.md §3 "Video context", §4.K).
#[derive(Default)]
pub struct Sequencer {
    display_index: u32,
    future_display_index: Option<u32>,

    /// Global display index at which the current concatenated segment
    /// began (spec.md §4.E, S3): each segment's own frame headers number
    /// their display numbers from 0, so this is added back on to recover
    /// the caller-visible, ever-increasing display index.
    segment_base: u32,

    past: Option<Rc<Image>>,
    future: Option<Rc<Image>>,
    sfuture: Option<Rc<Image>>,
    frame: Option<Rc<Image>>,
    sframe: Option<Rc<Image>>,

    /// The most recently decoded frame that turned out to be a future
    /// reference (`display_number > display_index`), held here until the
    /// next loop iteration's B-frame branch deposits it into `future`
    /// (`codec/decoder.c`'s `current_frame_is_future_frame` carried via
    /// the surviving local `frame`/`sframe` variables).
    pending: Option<Rc<Image>>,
    pending_smoothed: Option<Rc<Image>>,
    pending_is_future_ref: bool,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_index(&self) -> u32 {
        self.display_index
    }

    /// Advances the sequence by one displayed frame, returning `None` at
    /// end-of-stream (spec.md §8 property 6). `wfa` is the decoder's
    /// reusable working automaton (already holding the basis); it is
    /// overwritten by every `ContainerReader::parse_next_frame` call made
    /// from within this function.
    pub fn next_frame(
        &mut self,
        container: &mut ContainerReader,
        wfa: &mut Wfa,
        options: &DecoderOptions,
        clip: &ChromaClip,
    ) -> Result<Option<Rc<Image>>> {
        loop {
            if self.future_display_index == Some(self.display_index) {
                self.frame = self.future.take();
                self.sframe = self.sfuture.take();
                self.future_display_index = None;
                self.display_index += 1;
                return Ok(Some(self.displayed_frame()));
            }

            if self.display_index - self.segment_base >= container.info.frames {
                if container.try_advance_segment()? {
                    self.segment_base = self.display_index;
                    continue;
                }
                return Ok(None);
            }

            let display_number = self.segment_base + container.parse_next_frame(wfa)?;
            wfa.assign_coordinates(wfa.root_state as usize);

            self.rotate_reference_slots(wfa.frame_type, container.info.b_as_past_ref);

            let (width, height) = options.scaled_dimensions(container.info.width, container.info.height);
            let mut decoded = decode_image(wfa, width as usize, height as usize, options.format())?;
            if wfa.frame_type != FrameType::I {
                restore_mc(&mut decoded, wfa, self.past.as_deref(), self.future.as_deref(), clip)?;
            }
            let decoded = Rc::new(decoded);

            let effective = options.effective_smoothing(container.info.smoothing);
            let smoothed = if (1..=100).contains(&effective) {
                let mut s = (*decoded).clone();
                smooth_image(&mut s, wfa, wfa.joint_chroma_root(), effective)?;
                Some(Rc::new(s))
            } else {
                None
            };

            match display_number.cmp(&self.display_index) {
                std::cmp::Ordering::Equal => {
                    self.frame = Some(decoded);
                    self.sframe = smoothed;
                    self.display_index += 1;
                    return Ok(Some(self.displayed_frame()));
                }
                std::cmp::Ordering::Greater => {
                    self.future_display_index = Some(display_number);
                    self.pending = Some(decoded);
                    self.pending_smoothed = smoothed;
                    self.pending_is_future_ref = true;
                }
                std::cmp::Ordering::Less => {
                    return Err(Error::malformed(
                        "sequencer",
                        format!("frame display number {display_number} is behind display index {}", self.display_index),
                    ));
                }
            }
        }
    }

    fn displayed_frame(&self) -> Rc<Image> {
        self.sframe.clone().unwrap_or_else(|| {
            self.frame.clone().expect("a frame was just committed")
        })
    }

    /// Rotates `past`/`future`/`frame` ahead of decoding the just-parsed
    /// frame, mirroring `codec/decoder.c`'s per-type switch. Runs before
    /// `decode_image`/`restore_mc` so motion compensation reads the
    /// already-rotated references.
    fn rotate_reference_slots(&mut self, frame_type: FrameType, b_as_past_ref: bool) {
        let was_future_ref = std::mem::take(&mut self.pending_is_future_ref);
        match frame_type {
            FrameType::I => {
                self.past = None;
                self.future = None;
                self.sfuture = None;
                self.frame = None;
                self.sframe = None;
            }
            FrameType::P => {
                self.past = self.frame.take();
                self.frame = None;
                self.sframe = None;
                self.future = None;
                self.sfuture = None;
            }
            FrameType::B => {
                if was_future_ref {
                    self.future = self.pending.take();
                    self.sfuture = self.pending_smoothed.take();
                    self.frame = None;
                    self.sframe = None;
                } else if b_as_past_ref {
                    self.past = self.frame.take();
                    self.sframe = None;
                } else {
                    self.frame = None;
                    self.sframe = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::WfaInfo;
    use crate::rpf::{Rpf, RpfRange};

    fn gray_info(frames: u32) -> WfaInfo {
        WfaInfo {
            release: 2,
            title: String::new(),
            comment: String::new(),
            width: 4,
            height: 4,
            color: false,
            frames,
            fps: 25.0,
            p_min_level: 0,
            p_max_level: 10,
            search_range: 0,
            half_pixel: false,
            cross_b_search: false,
            b_as_past_ref: false,
            smoothing: 0,
            max_states: 100,
            chroma_max_states: 100,
            rpf: Rpf::new(6, RpfRange::R1_00),
            dc_rpf: Rpf::new(6, RpfRange::R1_00),
            d_rpf: Rpf::new(6, RpfRange::R1_00),
            d_dc_rpf: Rpf::new(6, RpfRange::R1_00),
        }
    }

    #[test]
    fn i_frame_rotation_clears_every_slot() {
        let mut seq = Sequencer::new();
        seq.frame = Some(Rc::new(Image::alloc_gray(4, 4)));
        seq.past = Some(Rc::new(Image::alloc_gray(4, 4)));
        seq.future = Some(Rc::new(Image::alloc_gray(4, 4)));
        seq.rotate_reference_slots(FrameType::I, false);
        assert!(seq.frame.is_none());
        assert!(seq.past.is_none());
        assert!(seq.future.is_none());
    }

    #[test]
    fn p_frame_rotation_promotes_frame_to_past() {
        let mut seq = Sequencer::new();
        let img = Rc::new(Image::alloc_gray(4, 4));
        seq.frame = Some(Rc::clone(&img));
        seq.rotate_reference_slots(FrameType::P, false);
        assert!(seq.frame.is_none());
        assert!(Rc::ptr_eq(seq.past.as_ref().unwrap(), &img));
    }

    #[test]
    fn b_frame_without_past_ref_leaves_past_and_future_untouched() {
        let mut seq = Sequencer::new();
        let past = Rc::new(Image::alloc_gray(4, 4));
        seq.past = Some(Rc::clone(&past));
        seq.frame = Some(Rc::new(Image::alloc_gray(4, 4)));
        seq.rotate_reference_slots(FrameType::B, false);
        assert!(Rc::ptr_eq(seq.past.as_ref().unwrap(), &past));
        assert!(seq.frame.is_none());
    }

    #[test]
    fn future_ref_pending_frame_is_deposited_on_next_b_frame() {
        let mut seq = Sequencer::new();
        let pending = Rc::new(Image::alloc_gray(4, 4));
        seq.pending = Some(Rc::clone(&pending));
        seq.pending_is_future_ref = true;
        seq.rotate_reference_slots(FrameType::B, false);
        assert!(Rc::ptr_eq(seq.future.as_ref().unwrap(), &pending));
        assert!(seq.pending.is_none());
    }

    #[test]
    fn zero_frame_stream_is_immediately_exhausted() {
        let info = gray_info(0);
        assert_eq!(info.frames, 0);
        // A sequencer whose display_index already meets the frame count
        // must report end-of-stream without touching the container.
        let seq = Sequencer::new();
        assert!(seq.display_index() >= info.frames);
    }
}
