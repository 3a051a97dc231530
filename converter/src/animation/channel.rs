//! Keyframe curves and their evaluation.

use crate::context::{ConvertContext, WarningKind};
use crate::document::{AnimationSource, ChannelSource, Document};
use crate::error::{ConvertError, Result};

use super::target::AnimationTarget;

/// Interpolation kernel of a keyframe segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    Bezier,
    Hermite,
    Cardinal,
    BSpline,
    Unknown,
}

impl Interpolation {
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "STEP" => Self::Step,
            "LINEAR" => Self::Linear,
            "BEZIER" => Self::Bezier,
            "HERMITE" => Self::Hermite,
            "CARDINAL" => Self::Cardinal,
            "BSPLINE" => Self::BSpline,
            _ => Self::Unknown,
        }
    }
}

/// Offset of a named member inside a target value.
fn member_offset(member: &str) -> Option<usize> {
    match member.to_ascii_uppercase().as_str() {
        "X" | "R" | "U" | "S" => Some(0),
        "Y" | "G" | "V" | "T" => Some(1),
        "Z" | "B" | "P" => Some(2),
        "W" | "Q" | "ANGLE" => Some(3),
        _ => None,
    }
}

/// Parse a member selector into `(data_offset, data_count)`.
///
/// - `""` addresses the whole value
/// - `".X"`, `".ANGLE"`, ... address one named member
/// - `"(i)"` and `"(i)(j)"` address one element, `(i)(j)` at `i * rows + j`
pub fn parse_selector(selector: &str, target: &AnimationTarget) -> Option<(usize, usize)> {
    let len = target.data_len();
    if selector.is_empty() {
        return Some((0, len));
    }
    let offset = if let Some(member) = selector.strip_prefix('.') {
        member_offset(member)?
    } else if selector.starts_with('(') {
        let indices: Vec<usize> = selector
            .strip_suffix(')')?
            .strip_prefix('(')?
            .split(")(")
            .map(|s| s.trim().parse().ok())
            .collect::<Option<_>>()?;
        match indices.as_slice() {
            [i] => *i,
            [i, j] => i * target.rows() + j,
            _ => return None,
        }
    } else {
        return None;
    };
    (offset < len).then_some((offset, 1))
}

/// Find `s` in `[0, 1]` with `curve(s) == time` by bisection.
///
/// `curve` must be monotonically increasing between `curve(0)` and `curve(1)`.
fn invert_curve(
    curve: impl Fn(f64) -> f64,
    time: f64,
    tolerance: f64,
    max_iterations: usize,
) -> Result<f64> {
    if (curve(0.0) - time).abs() <= tolerance {
        return Ok(0.0);
    }
    if (curve(1.0) - time).abs() <= tolerance {
        return Ok(1.0);
    }
    let (mut lo, mut hi) = (0.0f64, 1.0f64);
    for _ in 0..max_iterations {
        let mid = 0.5 * (lo + hi);
        let value = curve(mid);
        if (value - time).abs() <= tolerance {
            return Ok(mid);
        }
        if value < time {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Err(ConvertError::BisectionDiverged {
        iterations: max_iterations,
        time,
    })
}

fn bezier(p0: f64, c0: f64, c1: f64, p1: f64, s: f64) -> f64 {
    let r = 1.0 - s;
    r * r * r * p0 + 3.0 * r * r * s * c0 + 3.0 * r * s * s * c1 + s * s * s * p1
}

fn hermite(p0: f64, m0: f64, p1: f64, m1: f64, s: f64) -> f64 {
    let s2 = s * s;
    let s3 = s2 * s;
    (2.0 * s3 - 3.0 * s2 + 1.0) * p0
        + (s3 - 2.0 * s2 + s) * m0
        + (-2.0 * s3 + 3.0 * s2) * p1
        + (s3 - s2) * m1
}

/// One curve writing a slice of a target's values.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationChannel {
    pub target: AnimationTarget,
    /// One entry per keyframe.
    pub interpolation: Vec<Interpolation>,
    /// Strictly increasing keyframe times.
    pub input: Vec<f32>,
    /// `data_count` values per keyframe.
    pub output: Vec<f32>,
    /// `(time, value)` pair per value per keyframe.
    pub in_tangent: Option<Vec<f32>>,
    /// `(time, value)` pair per value per keyframe.
    pub out_tangent: Option<Vec<f32>>,
    pub data_offset: usize,
    pub data_count: usize,
}

impl AnimationChannel {
    /// Build a channel from its source.
    ///
    /// Returns `None` with a warning if the target is unresolved, the selector
    /// is malformed, or the curve arrays have inconsistent sizes.
    pub fn create(doc: &Document, animation: &AnimationSource, source: &ChannelSource) -> Option<Self> {
        let name = &animation.name;
        let Some(sampler) = animation.samplers.get(source.sampler) else {
            log::warn!("Animation '{name}': channel references missing sampler {}", source.sampler);
            return None;
        };
        let Some(target) = source.target.and_then(|t| AnimationTarget::resolve(doc, t)) else {
            log::warn!("Animation '{name}': channel target not resolved, channel dropped");
            return None;
        };
        let Some((data_offset, data_count)) = parse_selector(&source.selector, &target) else {
            log::warn!(
                "Animation '{name}': unsupported member selector '{}', channel dropped",
                source.selector
            );
            return None;
        };

        let keys = sampler.input.len();
        if keys == 0 {
            log::warn!("Animation '{name}': sampler has no keyframes, channel dropped");
            return None;
        }
        if sampler.output.len() != keys * data_count {
            log::warn!(
                "Animation '{name}': {} output values for {keys} keyframes of {data_count} values, channel dropped",
                sampler.output.len()
            );
            return None;
        }

        let tangent = |t: &Option<Vec<f32>>, label: &str| {
            t.as_ref().and_then(|t| {
                if t.len() == keys * data_count * 2 {
                    Some(t.clone())
                } else {
                    log::warn!(
                        "Animation '{name}': {label} tangent has {} values, expected {}, ignored",
                        t.len(),
                        keys * data_count * 2
                    );
                    None
                }
            })
        };
        let in_tangent = tangent(&sampler.in_tangent, "in");
        let out_tangent = tangent(&sampler.out_tangent, "out");

        let interpolation = match &sampler.interpolation {
            Some(names) => {
                if names.len() != keys {
                    log::warn!(
                        "Animation '{name}': {} interpolation entries for {keys} keyframes",
                        names.len()
                    );
                }
                (0..keys)
                    .map(|i| names.get(i).map_or(Interpolation::Linear, |n| Interpolation::parse(n)))
                    .collect()
            }
            None => vec![Interpolation::Linear; keys],
        };

        Some(Self {
            target,
            interpolation,
            input: sampler.input.clone(),
            output: sampler.output.clone(),
            in_tangent,
            out_tangent,
            data_offset,
            data_count,
        })
    }

    /// First keyframe time.
    pub fn start_time(&self) -> f32 {
        self.input[0]
    }

    /// Last keyframe time.
    pub fn end_time(&self) -> f32 {
        self.input[self.input.len() - 1]
    }

    /// Bracketing keyframe pair of `time` and the time clamped into range.
    ///
    /// Out-of-range times are clamped with a rate-limited warning.
    pub fn find_input_indices(&self, time: f32, ctx: &mut ConvertContext) -> (usize, usize, f32) {
        let last = self.input.len() - 1;
        let (start, end) = (self.input[0], self.input[last]);
        let mut t = time;
        if t < start || t > end {
            ctx.warnings.warn(WarningKind::TimeOutOfRange, || {
                format!("Animation time {time} outside keyframe range [{start}, {end}], clamped")
            });
            t = t.clamp(start, end);
        }
        if t >= end {
            return (last, last, t);
        }
        for i in 0..last {
            if t < self.input[i + 1] {
                return (i, i + 1, t);
            }
        }
        (last, last, t)
    }

    /// Evaluate the curve at `time` into `dest[data_offset..data_offset + data_count]`.
    pub fn apply_to_data(&self, dest: &mut [f32], time: f32, ctx: &mut ConvertContext) -> Result<()> {
        let (i0, i1, t) = self.find_input_indices(time, ctx);
        let n = self.data_count;
        let p0 = &self.output[i0 * n..(i0 + 1) * n];
        let p1 = &self.output[i1 * n..(i1 + 1) * n];
        let out = &mut dest[self.data_offset..self.data_offset + n];

        if i0 == i1 {
            out.copy_from_slice(p0);
            return Ok(());
        }

        let (t0, t1) = (self.input[i0], self.input[i1]);
        let mut kind = self.interpolation[i0];
        if matches!(kind, Interpolation::Bezier | Interpolation::Hermite)
            && (self.in_tangent.is_none() || self.out_tangent.is_none())
        {
            ctx.warnings.warn(WarningKind::MissingTangents, || {
                format!("{kind:?} keyframe at {t0} has no tangents, using LINEAR")
            });
            kind = Interpolation::Linear;
        }
        if matches!(
            kind,
            Interpolation::Cardinal | Interpolation::BSpline | Interpolation::Unknown
        ) {
            ctx.warnings.warn(WarningKind::UnsupportedInterpolation, || {
                format!("{kind:?} interpolation is not supported, using STEP")
            });
            kind = Interpolation::Step;
        }

        match kind {
            Interpolation::Step => out.copy_from_slice(p0),
            Interpolation::Linear => {
                let s = (t - t0) / (t1 - t0);
                for c in 0..n {
                    out[c] = p0[c] + s * (p1[c] - p0[c]);
                }
            }
            Interpolation::Bezier | Interpolation::Hermite => {
                let (Some(tin), Some(tout)) = (&self.in_tangent, &self.out_tangent) else {
                    return Ok(());
                };
                let max_iterations = ctx.options.bisection_max_iterations;
                for c in 0..n {
                    let o = (i0 * n + c) * 2;
                    let i = (i1 * n + c) * 2;
                    let (c0t, c0v) = (f64::from(tout[o]), f64::from(tout[o + 1]));
                    let (c1t, c1v) = (f64::from(tin[i]), f64::from(tin[i + 1]));
                    let (t0, t1, v0, v1) = (
                        f64::from(t0),
                        f64::from(t1),
                        f64::from(p0[c]),
                        f64::from(p1[c]),
                    );
                    let value = if kind == Interpolation::Bezier {
                        let tolerance = (t1 - t0).abs() * 1e-4;
                        let s = invert_curve(
                            |s| bezier(t0, c0t, c1t, t1, s),
                            f64::from(t),
                            tolerance,
                            max_iterations,
                        )?;
                        bezier(v0, c0v, c1v, v1, s)
                    } else {
                        let tolerance = (t1 - t0).abs() * 1e-5;
                        let s = invert_curve(
                            |s| hermite(t0, c0t, t1, c1t, s),
                            f64::from(t),
                            tolerance,
                            max_iterations,
                        )?;
                        hermite(v0, c0v, v1, c1v, s)
                    };
                    out[c] = value as f32;
                }
            }
            Interpolation::Cardinal | Interpolation::BSpline | Interpolation::Unknown => {
                out.copy_from_slice(p0)
            }
        }
        Ok(())
    }

    /// Evaluate at `time` and write into the target node transform.
    pub fn apply(&self, doc: &mut Document, time: f32, ctx: &mut ConvertContext) -> Result<()> {
        let range = self.data_offset..self.data_offset + self.data_count;
        let mut values = self.target.data(doc).to_vec();
        if values.len() < range.end {
            return Ok(());
        }
        self.apply_to_data(&mut values, time, ctx)?;
        self.target.apply_animation(doc, self.data_offset, &values[range]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{
        ChannelTarget, Node, NodeId, NodeTransform, SamplerSource, TransformKind,
    };
    use rstest::rstest;

    fn doc_with_node() -> (Document, NodeId) {
        let mut doc = Document::new();
        let node = doc.add_node(
            Node::new("n")
                .with_transform(NodeTransform::translate([0.0; 3]).with_sid("location"))
                .with_transform(NodeTransform::rotate([0.0, 0.0, 1.0], 0.0).with_sid("rotZ"))
                .with_transform(NodeTransform::matrix([0.0; 16]).with_sid("transform")),
            None,
        );
        (doc, node)
    }

    fn target(doc: &Document, node: NodeId, transform: usize) -> AnimationTarget {
        AnimationTarget::resolve(doc, ChannelTarget { node, transform }).unwrap()
    }

    #[rstest]
    #[case::whole("", 1, Some((0, 4)))]
    #[case::angle(".ANGLE", 1, Some((3, 1)))]
    #[case::member_y(".Y", 0, Some((1, 1)))]
    #[case::member_w_out_of_range(".W", 0, None)]
    #[case::unknown_member(".FOO", 0, None)]
    #[case::single_index("(2)", 0, Some((2, 1)))]
    #[case::matrix_element("(1)(3)", 2, Some((7, 1)))]
    #[case::three_indices("(0)(0)(0)", 2, None)]
    #[case::garbage("[0]", 2, None)]
    fn selector_parsing(
        #[case] selector: &str,
        #[case] transform: usize,
        #[case] expected: Option<(usize, usize)>,
    ) {
        let (doc, node) = doc_with_node();
        assert_eq!(parse_selector(selector, &target(&doc, node, transform)), expected);
    }

    fn channel(
        doc: &Document,
        node: NodeId,
        interpolation: &str,
        in_tangent: Option<Vec<f32>>,
        out_tangent: Option<Vec<f32>>,
    ) -> AnimationChannel {
        let animation = AnimationSource {
            name: "anim".into(),
            samplers: vec![SamplerSource {
                input: vec![0.0, 1.0, 2.0],
                output: vec![0.0, 10.0, 20.0],
                in_tangent,
                out_tangent,
                interpolation: Some(vec![interpolation.to_string(); 3]),
            }],
            channels: vec![ChannelSource {
                sampler: 0,
                target: Some(ChannelTarget { node, transform: 1 }),
                selector: ".ANGLE".into(),
            }],
            children: vec![],
        };
        AnimationChannel::create(doc, &animation, &animation.channels[0]).unwrap()
    }

    fn sample(channel: &AnimationChannel, time: f32, ctx: &mut ConvertContext) -> f32 {
        let mut data = [0.0; 4];
        channel.apply_to_data(&mut data, time, ctx).unwrap();
        data[3]
    }

    #[rstest]
    #[case::linear_start("LINEAR", 0.0, 0.0)]
    #[case::linear_mid("LINEAR", 1.5, 15.0)]
    #[case::step_mid("STEP", 1.5, 10.0)]
    #[case::clamped_after_end("LINEAR", 5.0, 20.0)]
    #[case::clamped_before_start("LINEAR", -1.0, 0.0)]
    #[case::step_at_interior_key("STEP", 1.0, 10.0)]
    #[case::step_at_end("STEP", 2.0, 20.0)]
    #[case::step_clamped_after_end("STEP", 5.0, 20.0)]
    #[case::linear_at_end("LINEAR", 2.0, 20.0)]
    #[case::cardinal_at_end("CARDINAL", 2.0, 20.0)]
    #[case::cardinal_falls_back_to_step("CARDINAL", 0.5, 0.0)]
    #[case::unknown_falls_back_to_step("CUBIC", 0.5, 0.0)]
    #[case::bezier_without_tangents_is_linear("BEZIER", 0.5, 5.0)]
    fn sampling(#[case] interpolation: &str, #[case] time: f32, #[case] expected: f32) {
        let (doc, node) = doc_with_node();
        let mut ctx = ConvertContext::default();
        let channel = channel(&doc, node, interpolation, None, None);
        assert!((sample(&channel, time, &mut ctx) - expected).abs() < 1e-5);
    }

    #[test]
    fn bezier_with_linear_control_points_matches_linear() {
        let (doc, node) = doc_with_node();
        let mut ctx = ConvertContext::default();
        // Control points on the straight line between keys.
        let out_tangent = vec![1.0 / 3.0, 10.0 / 3.0, 4.0 / 3.0, 40.0 / 3.0, 2.0, 20.0];
        let in_tangent = vec![0.0, 0.0, 2.0 / 3.0, 20.0 / 3.0, 5.0 / 3.0, 50.0 / 3.0];
        let channel = channel(&doc, node, "BEZIER", Some(in_tangent), Some(out_tangent));
        for &t in &[0.0, 0.25, 0.5, 1.0, 1.7, 2.0] {
            assert!((sample(&channel, t, &mut ctx) - 10.0 * t).abs() < 0.01, "t = {t}");
        }
    }

    #[test]
    fn hermite_hits_keyframes_and_eases() {
        let (doc, node) = doc_with_node();
        let mut ctx = ConvertContext::default();
        // Time derivative equal to the interval, zero value derivative.
        let tangent = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let channel = channel(&doc, node, "HERMITE", Some(tangent.clone()), Some(tangent));
        assert!((sample(&channel, 0.0, &mut ctx) - 0.0).abs() < 1e-4);
        assert!((sample(&channel, 1.0, &mut ctx) - 10.0).abs() < 1e-4);
        assert!((sample(&channel, 0.5, &mut ctx) - 5.0).abs() < 1e-3);
        let early = sample(&channel, 0.1, &mut ctx);
        assert!(early < 1.0, "eased start, got {early}");
    }

    #[test]
    fn bisection_budget_exhausted_is_an_error() {
        let (doc, node) = doc_with_node();
        let mut ctx = ConvertContext::default();
        ctx.options.bisection_max_iterations = 3;
        let out_tangent = vec![0.9, 0.0, 0.9, 0.0, 0.9, 0.0];
        let in_tangent = vec![0.1, 0.0, 0.1, 0.0, 0.1, 0.0];
        let channel = channel(&doc, node, "BEZIER", Some(in_tangent), Some(out_tangent));
        let mut data = [0.0; 4];
        let err = channel.apply_to_data(&mut data, 0.37, &mut ctx).unwrap_err();
        assert!(matches!(err, ConvertError::BisectionDiverged { iterations: 3, .. }));
    }

    #[test]
    fn out_of_range_warnings_are_rate_limited() {
        let (doc, node) = doc_with_node();
        let mut ctx = ConvertContext::default();
        let channel = channel(&doc, node, "LINEAR", None, None);
        for _ in 0..25 {
            sample(&channel, 3.0, &mut ctx);
        }
        assert_eq!(ctx.warnings.count(WarningKind::TimeOutOfRange), 25);
    }

    #[test]
    fn output_size_mismatch_drops_channel() {
        let (doc, node) = doc_with_node();
        let animation = AnimationSource {
            name: "anim".into(),
            samplers: vec![SamplerSource {
                input: vec![0.0, 1.0],
                output: vec![0.0, 1.0, 2.0],
                ..Default::default()
            }],
            channels: vec![ChannelSource {
                sampler: 0,
                target: Some(ChannelTarget { node, transform: 0 }),
                selector: "".into(),
            }],
            children: vec![],
        };
        assert!(AnimationChannel::create(&doc, &animation, &animation.channels[0]).is_none());
    }

    #[test]
    fn apply_writes_matrix_element() {
        let (mut doc, node) = doc_with_node();
        let animation = AnimationSource {
            name: "anim".into(),
            samplers: vec![SamplerSource {
                input: vec![0.0, 1.0],
                output: vec![1.0, 3.0],
                ..Default::default()
            }],
            channels: vec![ChannelSource {
                sampler: 0,
                target: Some(ChannelTarget { node, transform: 2 }),
                selector: "(0)(3)".into(),
            }],
            children: vec![],
        };
        let channel = AnimationChannel::create(&doc, &animation, &animation.channels[0]).unwrap();
        assert_eq!(channel.target.kind, TransformKind::Matrix);
        let mut ctx = ConvertContext::default();
        channel.apply(&mut doc, 0.5, &mut ctx).unwrap();
        assert_eq!(doc.node(node).transforms[2].data[3], 2.0);
    }
}
