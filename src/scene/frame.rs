//! Scoped frame selection.

use super::Scene;
use std::ops::{Deref, DerefMut};

/// Sets the scene's current frame and restores the previous one when dropped,
/// including when an export bails out early with an error.
pub struct FrameGuard<'a, S: Scene + ?Sized> {
    scene: &'a mut S,
    saved: i32,
}

impl<'a, S: Scene + ?Sized> FrameGuard<'a, S> {
    pub fn new(scene: &'a mut S, frame: i32) -> Self {
        let saved = scene.current_frame();
        scene.set_current_frame(frame);
        log::trace!("frame {} selected (was {})", frame, saved);
        Self { scene, saved }
    }
}

impl<S: Scene + ?Sized> Deref for FrameGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.scene
    }
}

impl<S: Scene + ?Sized> DerefMut for FrameGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.scene
    }
}

impl<S: Scene + ?Sized> Drop for FrameGuard<'_, S> {
    fn drop(&mut self) {
        self.scene.set_current_frame(self.saved);
    }
}
