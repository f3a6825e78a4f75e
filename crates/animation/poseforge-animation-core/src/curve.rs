//! Ordered keyframes for one property of one node, with a per-frame value
//! cache. Frames are unique and strictly increasing in storage order.

use poseforge_api_core::{shortest_delta_deg, AnimProperty};
use serde::{Deserialize, Serialize};

use crate::error::AnimError;
use crate::key::{AnimationKey, Interpolation, Vec2};

/// Evaluate the segment between two keys at an integer frame.
///
/// Bezier segments run De Casteljau over `(A, A + out, B - in, B)` at the
/// normalized frame parameter and read the y component of the evaluated
/// point; `Linear` and `Constant` are the degenerate cases of the same
/// curve.
pub fn segment_value(a: &AnimationKey, b: &AnimationKey, frame: i32) -> f32 {
    if b.frame <= a.frame {
        return a.value;
    }
    let t = (frame - a.frame) as f32 / (b.frame - a.frame) as f32;
    match a.interpolation {
        Interpolation::Constant => a.value,
        Interpolation::Linear => a.value + (b.value - a.value) * t,
        Interpolation::Bezier | Interpolation::Other => {
            let p0 = Vec2::new(a.frame as f32, a.value);
            let p3 = Vec2::new(b.frame as f32, b.value);
            let p1 = p0 + a.out_tangent;
            let p2 = p3 - b.in_tangent;
            decasteljau(p0, p1, p2, p3, t).y
        }
    }
}

fn decasteljau(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2, t: f32) -> Vec2 {
    let q0 = p0.lerp(p1, t);
    let q1 = p1.lerp(p2, t);
    let q2 = p2.lerp(p3, t);
    let r0 = q0.lerp(q1, t);
    let r1 = q1.lerp(q2, t);
    r0.lerp(r1, t)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    property: AnimProperty,
    keys: Vec<AnimationKey>,
    /// Per-frame values over `[cache_start, cache_start + cache.len())`.
    /// Skipped by serialization: the external collaborator only receives the
    /// plain key list. Call [`Curve::compute_cache`] after deserializing.
    #[serde(skip)]
    cache: Vec<f32>,
    #[serde(skip)]
    cache_start: i32,
}

impl Curve {
    pub fn new(property: AnimProperty) -> Self {
        Self {
            property,
            keys: Vec::new(),
            cache: Vec::new(),
            cache_start: 0,
        }
    }

    #[inline]
    pub fn property(&self) -> AnimProperty {
        self.property
    }

    #[inline]
    pub fn keys(&self) -> &[AnimationKey] {
        &self.keys
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// First and last keyed frame.
    #[inline]
    pub fn frame_span(&self) -> Option<(i32, i32)> {
        match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => Some((first.frame, last.frame)),
            _ => None,
        }
    }

    #[inline]
    fn find(&self, frame: i32) -> Result<usize, usize> {
        self.keys.binary_search_by_key(&frame, |key| key.frame)
    }

    /// Angle filtering: rotation values are re-expressed as the previous
    /// key's value plus the signed shortest delta, so consecutive keys never
    /// jump across the ±180° seam.
    fn filtered_value(&self, insert_at: usize, raw: f32) -> f32 {
        if !self.property.is_rotation() || insert_at == 0 {
            return raw;
        }
        let previous = self.keys[insert_at - 1].value;
        previous + shortest_delta_deg(previous, raw)
    }

    /// Insert a key, or update value and interpolation of an existing key at
    /// the same frame (tangents are kept). Returns the key's index.
    pub fn add_key(&mut self, frame: i32, value: f32, interpolation: Interpolation) -> usize {
        let index = match self.find(frame) {
            Ok(index) => {
                let filtered = self.filtered_value(index, value);
                let key = &mut self.keys[index];
                key.value = filtered;
                key.interpolation = interpolation;
                index
            }
            Err(index) => {
                let filtered = self.filtered_value(index, value);
                self.keys
                    .insert(index, AnimationKey::new(frame, filtered, interpolation));
                index
            }
        };
        self.compute_cache();
        index
    }

    /// Append a key past the current last frame in O(1) amortized; falls
    /// back to [`Curve::add_key`] when the frame is not increasing.
    pub fn append_key(&mut self, frame: i32, value: f32, interpolation: Interpolation) -> usize {
        match self.keys.last() {
            Some(last) if frame > last.frame => {
                let filtered = self.filtered_value(self.keys.len(), value);
                self.keys
                    .push(AnimationKey::new(frame, filtered, interpolation));
                self.extend_cache();
                self.keys.len() - 1
            }
            Some(_) => self.add_key(frame, value, interpolation),
            None => self.add_key(frame, value, interpolation),
        }
    }

    pub fn remove_key(&mut self, frame: i32) -> Result<AnimationKey, AnimError> {
        let index = self
            .find(frame)
            .map_err(|_| AnimError::KeyNotFound { frame })?;
        let key = self.keys.remove(index);
        self.compute_cache();
        Ok(key)
    }

    /// Move a key to a new frame, keeping value and tangents. Moving onto an
    /// occupied frame is an error.
    pub fn move_key(&mut self, frame: i32, new_frame: i32) -> Result<(), AnimError> {
        if frame == new_frame {
            return Ok(());
        }
        let index = self
            .find(frame)
            .map_err(|_| AnimError::KeyNotFound { frame })?;
        if self.find(new_frame).is_ok() {
            return Err(AnimError::DuplicateKey { frame: new_frame });
        }
        let mut key = self.keys.remove(index);
        key.frame = new_frame;
        let target = self.find(new_frame).unwrap_or_else(|slot| slot);
        self.keys.insert(target, key);
        self.compute_cache();
        Ok(())
    }

    /// Last key at or before `frame`.
    pub fn prev_key(&self, frame: i32) -> Option<&AnimationKey> {
        match self.find(frame) {
            Ok(index) => Some(&self.keys[index]),
            Err(0) => None,
            Err(index) => Some(&self.keys[index - 1]),
        }
    }

    /// First key strictly after `frame`.
    pub fn next_key(&self, frame: i32) -> Option<&AnimationKey> {
        match self.find(frame) {
            Ok(index) => self.keys.get(index + 1),
            Err(index) => self.keys.get(index),
        }
    }

    /// Key indices `(i, i + 1)` bracketing `frame`, or `None` when the frame
    /// is outside the keyed range or fewer than two keys exist.
    pub fn bracketing_pair(&self, frame: i32) -> Option<(usize, usize)> {
        let (first, last) = self.frame_span()?;
        if self.keys.len() < 2 || frame < first || frame > last {
            return None;
        }
        let left = match self.find(frame) {
            Ok(index) if index + 1 == self.keys.len() => index - 1,
            Ok(index) => index,
            Err(index) => index - 1,
        };
        Some((left, left + 1))
    }

    /// Edited key pair for a zone selection: the last key at or before
    /// `start` and the first key at or after `end`. When the two collapse
    /// onto one key the pair extends forward (or, at the curve's tail,
    /// backward).
    pub fn zone_pair(&self, start: i32, end: i32) -> Option<(usize, usize)> {
        if self.keys.len() < 2 || start > end {
            return None;
        }
        let mut left = match self.find(start) {
            Ok(index) => index,
            Err(0) => return None,
            Err(index) => index - 1,
        };
        let mut right = match self.find(end) {
            Ok(index) => index,
            Err(index) => index,
        };
        if right <= left {
            right = left + 1;
        }
        if right >= self.keys.len() {
            if left >= 1 && self.keys[left].frame >= end {
                right = left;
                left -= 1;
            } else {
                return None;
            }
        }
        Some((left, right))
    }

    /// Cached value at an integer frame. `None` when the curve is empty or
    /// the frame lies outside `[first, last]`; callers supply the fallback.
    pub fn evaluate(&self, frame: i32) -> Option<f32> {
        let (first, last) = self.frame_span()?;
        if frame < first || frame > last {
            return None;
        }
        self.cache.get((frame - self.cache_start) as usize).copied()
    }

    /// Rebuild the whole evaluation table. Required after any structural
    /// edit (add/remove/move).
    pub fn compute_cache(&mut self) {
        self.cache.clear();
        let Some((first, last)) = self.frame_span() else {
            self.cache_start = 0;
            return;
        };
        self.cache_start = first;
        self.cache.resize((last - first + 1) as usize, 0.0);
        if self.keys.len() == 1 {
            self.cache[0] = self.keys[0].value;
            return;
        }
        for segment in 0..self.keys.len() - 1 {
            self.fill_segment(segment);
        }
    }

    /// Refresh only the cached segments touching the key at `index`, for
    /// tangent-only edits. Falls back to a full rebuild when the table is
    /// out of sync with the key span.
    pub fn compute_cache_at(&mut self, index: usize) {
        let Some((first, last)) = self.frame_span() else {
            self.cache.clear();
            self.cache_start = 0;
            return;
        };
        let expected = (last - first + 1) as usize;
        if index >= self.keys.len() || self.cache_start != first || self.cache.len() != expected {
            self.compute_cache();
            return;
        }
        if self.keys.len() == 1 {
            self.cache[0] = self.keys[0].value;
            return;
        }
        if index > 0 {
            self.fill_segment(index - 1);
        }
        if index + 1 < self.keys.len() {
            self.fill_segment(index);
        }
    }

    fn fill_segment(&mut self, segment: usize) {
        let a = self.keys[segment];
        let b = self.keys[segment + 1];
        for frame in a.frame..=b.frame {
            self.cache[(frame - self.cache_start) as usize] = segment_value(&a, &b, frame);
        }
    }

    fn extend_cache(&mut self) {
        let Some((first, last)) = self.frame_span() else {
            return;
        };
        if self.keys.len() == 1 {
            self.cache_start = first;
            self.cache = vec![self.keys[0].value];
            return;
        }
        // Only the tail segment is new; anything else means the table was
        // stale and needs the full pass.
        let expected_before = (self.keys[self.keys.len() - 2].frame - first + 1) as usize;
        if self.cache_start != first || self.cache.len() != expected_before {
            self.compute_cache();
            return;
        }
        self.cache.resize((last - first + 1) as usize, 0.0);
        self.fill_segment(self.keys.len() - 2);
    }

    /// Direct mutable access for the tangent solver; the caller is
    /// responsible for refreshing the cache at the edited indices.
    pub(crate) fn keys_mut(&mut self) -> &mut [AnimationKey] {
        &mut self.keys
    }
}

/// Mutable tangent access used by the solvers; kept as a free function so
/// the write-back site reads like the operation it is.
pub fn apply_tangent_delta(
    curve: &mut Curve,
    index: usize,
    in_delta: Vec2,
    out_delta: Vec2,
) {
    if let Some(key) = curve.keys_mut().get_mut(index) {
        key.in_tangent += in_delta;
        key.out_tangent += out_delta;
    }
    curve.compute_cache_at(index);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decasteljau_endpoints() {
        let p0 = Vec2::new(0.0, 0.0);
        let p1 = Vec2::new(1.0, 2.0);
        let p2 = Vec2::new(2.0, -1.0);
        let p3 = Vec2::new(3.0, 5.0);
        let start = decasteljau(p0, p1, p2, p3, 0.0);
        let end = decasteljau(p0, p1, p2, p3, 1.0);
        assert!((start.y - p0.y).abs() < 1e-6);
        assert!((end.y - p3.y).abs() < 1e-6);
    }

    #[test]
    fn linear_segment_is_exact() {
        let a = AnimationKey::new(0, 0.0, Interpolation::Linear);
        let b = AnimationKey::new(10, 10.0, Interpolation::Linear);
        assert!((segment_value(&a, &b, 5) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn constant_segment_holds_left_value() {
        let a = AnimationKey::new(0, 3.0, Interpolation::Constant);
        let b = AnimationKey::new(10, 10.0, Interpolation::Constant);
        assert!((segment_value(&a, &b, 9) - 3.0).abs() < 1e-6);
    }
}
