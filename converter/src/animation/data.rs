//! Uniformly resampled animation clips.

use crate::context::ConvertContext;
use crate::document::Document;
use crate::error::Result;
use crate::math::{quat_angle, Quat, Vec3};
use crate::options::PruningOptions;
use crate::profiling::{profile_function, profile_plot, profile_scope};
use crate::skeleton::{bone_poses, BonePose, Skeleton, WorldTransform};

use super::channel::AnimationChannel;

/// Resampling rate used when no channel yields a rate.
pub const FALLBACK_FPS: f32 = 10.0;

/// Time range and average keyframe rate of a set of channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStatistics {
    pub start: f32,
    pub end: f32,
    /// Keyframe intervals per second, over all channels.
    pub original_fps: Option<f32>,
}

impl TimeStatistics {
    /// Gather statistics over keyframes `[begin, end]` of every channel.
    ///
    /// Indices are clamped to each channel's keyframe count; `None` means the
    /// first or last keyframe respectively.
    pub fn compute(
        channels: &[AnimationChannel],
        begin: Option<usize>,
        end: Option<usize>,
    ) -> Option<Self> {
        let mut stats: Option<Self> = None;
        let mut intervals = 0usize;
        let mut durations = 0.0f32;
        for channel in channels {
            let last = channel.input.len() - 1;
            let b = begin.unwrap_or(0).min(last);
            let e = end.unwrap_or(last).min(last).max(b);
            let (t0, t1) = (channel.input[b], channel.input[e]);
            intervals += e - b;
            durations += t1 - t0;
            stats = Some(match stats {
                Some(s) => Self {
                    start: s.start.min(t0),
                    end: s.end.max(t1),
                    original_fps: None,
                },
                None => Self {
                    start: t0,
                    end: t1,
                    original_fps: None,
                },
            });
        }
        stats.map(|s| Self {
            original_fps: (durations > 0.0 && intervals > 0).then(|| intervals as f32 / durations),
            ..s
        })
    }

    pub fn duration(&self) -> f32 {
        self.end - self.start
    }
}

/// Sampled transform track of one bone.
///
/// A component is `None` when it stays within the pruning tolerance of the
/// rest pose for the whole clip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationDataTrack {
    pub bone: usize,
    pub pos: Option<Vec<Vec3>>,
    pub rot: Option<Vec<Quat>>,
    pub scl: Option<Vec<Vec3>>,
    /// Translation relative to the rest pose.
    pub rel_pos: Option<Vec<Vec3>>,
    /// Rotation relative to the rest pose.
    pub rel_rot: Option<Vec<Quat>>,
    /// Scale relative to the rest pose.
    pub rel_scl: Option<Vec<Vec3>>,
}

impl AnimationDataTrack {
    /// Whether every component was pruned.
    pub fn is_empty(&self) -> bool {
        self.pos.is_none() && self.rot.is_none() && self.scl.is_none()
    }

    /// Pose at `frame`, with pruned components taken from `rest`.
    pub fn pose(&self, frame: usize, rest: &BonePose) -> BonePose {
        BonePose {
            pos: self.pos.as_ref().map_or(rest.pos, |v| v[frame]),
            rot: self.rot.as_ref().map_or(rest.rot, |v| v[frame]),
            scl: self.scl.as_ref().map_or(rest.scl, |v| v[frame]),
        }
    }
}

/// Maximum deviation of a track from the rest pose.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Deviation {
    pos: f32,
    rot: f32,
    scl: f32,
}

/// A clip resampled at a uniform rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationData {
    pub name: String,
    /// First sampled source time.
    pub start_time: f32,
    pub duration: f32,
    pub keyframes: usize,
    pub fps: f32,
    /// Average keyframe rate of the source channels.
    pub original_fps: f32,
    /// One track per skeleton bone.
    pub tracks: Vec<AnimationDataTrack>,
}

fn sign_continuous(rotations: &mut [Quat], reference: Quat) {
    let mut prev = reference;
    for q in rotations.iter_mut() {
        if q.coords.dot(&prev.coords) < 0.0 {
            *q = -*q;
        }
        prev = *q;
    }
}

impl AnimationData {
    /// Resample `channels` for every bone of `skeleton`.
    ///
    /// Channels are applied to the document's node transforms at every sample
    /// time; the document is reset to its rest pose afterwards. Returns
    /// `Ok(None)` if there is nothing to sample.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        name: impl Into<String>,
        doc: &mut Document,
        skeleton: &Skeleton,
        channels: &[AnimationChannel],
        begin: Option<usize>,
        end: Option<usize>,
        world: &WorldTransform,
        ctx: &mut ConvertContext,
    ) -> Result<Option<Self>> {
        profile_function!();
        let name = name.into();
        let Some(stats) = TimeStatistics::compute(channels, begin, end) else {
            log::warn!("Animation '{name}' has no usable channels");
            return Ok(None);
        };
        if skeleton.is_empty() {
            log::warn!("Animation '{name}' has no skeleton to drive");
            return Ok(None);
        }

        let original_fps = stats.original_fps.unwrap_or(FALLBACK_FPS);
        let requested_fps = ctx.options.animation_fps.unwrap_or(original_fps);
        let duration = stats.duration();
        let (keyframes, fps) = if duration > 0.0 {
            let keyframes = (requested_fps * duration).ceil() as usize + 1;
            (keyframes, (keyframes - 1) as f32 / duration)
        } else {
            (1, requested_fps)
        };
        log::info!(
            "Animation '{name}': {} channels, {duration:.3}s, source {original_fps:.2} fps, resampled to {keyframes} keyframes at {fps:.2} fps",
            channels.len()
        );
        profile_plot!("animation_keyframes", keyframes);

        let bone_count = skeleton.len();
        let mut samples: Vec<Vec<BonePose>> = vec![Vec::with_capacity(keyframes); bone_count];
        let sampled = (|| -> Result<()> {
            profile_scope!("sample_keyframes");
            for i in 0..keyframes {
                let time = Self::sample_time(stats.start, stats.end, i, keyframes);
                for channel in channels {
                    channel.apply(doc, time, ctx)?;
                }
                for (bone, pose) in bone_poses(doc, skeleton, world).into_iter().enumerate() {
                    samples[bone].push(pose);
                }
            }
            Ok(())
        })();
        doc.reset_animation();
        sampled?;

        let rest = bone_poses(doc, skeleton, world);
        let pruning = ctx.options.pruning;
        let tracks = samples
            .into_iter()
            .enumerate()
            .map(|(bone, poses)| Self::build_track(bone, poses, &rest[bone], &pruning))
            .collect();

        Ok(Some(Self {
            name,
            start_time: stats.start,
            duration,
            keyframes,
            fps,
            original_fps,
            tracks,
        }))
    }

    /// Time of sample `i` out of `keyframes`, exact at both ends.
    pub fn sample_time(start: f32, end: f32, i: usize, keyframes: usize) -> f32 {
        if keyframes < 2 {
            return start;
        }
        let a = i as f32 / (keyframes - 1) as f32;
        start * (1.0 - a) + end * a
    }

    /// Time of keyframe `i` relative to the clip start.
    pub fn frame_time(&self, i: usize) -> f32 {
        Self::sample_time(0.0, self.duration, i, self.keyframes)
    }

    fn build_track(
        bone: usize,
        poses: Vec<BonePose>,
        rest: &BonePose,
        pruning: &PruningOptions,
    ) -> AnimationDataTrack {
        let pos: Vec<Vec3> = poses.iter().map(|p| p.pos).collect();
        let mut rot: Vec<Quat> = poses.iter().map(|p| p.rot).collect();
        let scl: Vec<Vec3> = poses.iter().map(|p| p.scl).collect();
        sign_continuous(&mut rot, rest.rot);

        let rest_rot_inv = rest.rot.conjugate();
        let safe = |v: f32| if v.abs() > 1e-12 { v } else { 1.0 };
        let rel_pos: Vec<Vec3> = pos.iter().map(|p| p - rest.pos).collect();
        let mut rel_rot: Vec<Quat> = rot.iter().map(|q| rest_rot_inv * q).collect();
        sign_continuous(&mut rel_rot, Quat::identity());
        let rel_scl: Vec<Vec3> = scl
            .iter()
            .map(|s| {
                Vec3::new(
                    s.x / safe(rest.scl.x),
                    s.y / safe(rest.scl.y),
                    s.z / safe(rest.scl.z),
                )
            })
            .collect();

        let mut deviation = Deviation::default();
        for ((p, q), s) in rel_pos.iter().zip(&rel_rot).zip(&rel_scl) {
            deviation.pos = deviation.pos.max(p.norm());
            deviation.rot = deviation.rot.max(quat_angle(*q));
            deviation.scl = deviation.scl.max((s - Vec3::new(1.0, 1.0, 1.0)).amax());
        }

        let keep = |dev: f32, tolerance: f32| !pruning.enabled || dev >= tolerance;
        let (keep_pos, keep_rot, keep_scl) = (
            keep(deviation.pos, pruning.position),
            keep(deviation.rot, pruning.rotation),
            keep(deviation.scl, pruning.scale),
        );
        AnimationDataTrack {
            bone,
            pos: keep_pos.then_some(pos),
            rot: keep_rot.then_some(rot),
            scl: keep_scl.then_some(scl),
            rel_pos: keep_pos.then_some(rel_pos),
            rel_rot: keep_rot.then_some(rel_rot),
            rel_scl: keep_scl.then_some(rel_scl),
        }
    }
}
