use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Mutex, PoisonError,
};

use image::{imageops, DynamicImage, Rgb, RgbImage};
use rand::Rng;

use super::{Frame, VideoError, VideoIo};

/// Camera stand-in that renders a tinted gradient, drifting to a new random
/// tint every few frames so a classifier has something to react to.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    enabled: AtomicBool,
    mirrored: AtomicBool,
    frames: AtomicU64,
    tint: Mutex<[u8; 3]>,
}

const FRAMES_PER_TINT: u64 = 4;

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            enabled: AtomicBool::new(false),
            mirrored: AtomicBool::new(true),
            frames: AtomicU64::new(0),
            tint: Mutex::new([200, 60, 60]),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored.load(Ordering::SeqCst)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    fn next_tint(&self) -> [u8; 3] {
        let count = self.frames.fetch_add(1, Ordering::SeqCst);
        let mut tint = self.tint.lock().unwrap_or_else(PoisonError::into_inner);
        if count > 0 && count % FRAMES_PER_TINT == 0 {
            let mut rng = rand::thread_rng();
            *tint = [rng.gen(), rng.gen(), rng.gen()];
        }
        *tint
    }

    fn render(&self, tint: [u8; 3]) -> RgbImage {
        let width = self.width.max(1);
        RgbImage::from_fn(self.width, self.height, |x, _| {
            let shade = (x * 255 / width) as u16;
            Rgb(tint.map(|channel| ((channel as u16 * (128 + shade / 2)) / 255) as u8))
        })
    }
}

impl VideoIo for SyntheticCamera {
    fn enable(&self) -> Result<(), VideoError> {
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn set_mirror(&self, mirror: bool) {
        self.mirrored.store(mirror, Ordering::SeqCst);
    }

    fn current_frame(&self) -> Result<Frame, VideoError> {
        if !self.is_enabled() {
            return Err(VideoError::Disabled);
        }

        let mut image = self.render(self.next_tint());
        if self.is_mirrored() {
            imageops::flip_horizontal_in_place(&mut image);
        }
        Ok(Frame::new(DynamicImage::ImageRgb8(image)))
    }
}
