//! Animation channels and resampled clips.
//!
//! - [`AnimationTarget`] - a node transform component written by a channel
//! - [`AnimationChannel`] - one keyframe curve and its interpolation kernels
//! - [`AnimationData`] - a clip resampled at a uniform rate for a skeleton

mod channel;
mod data;
mod target;

pub use channel::{parse_selector, AnimationChannel, Interpolation};
pub use data::{AnimationData, AnimationDataTrack, TimeStatistics, FALLBACK_FPS};
pub use target::AnimationTarget;

use crate::document::{AnimationSource, Document};

/// Build the channels of an animation and all of its nested animations.
///
/// Channels that cannot be built are dropped.
pub fn collect_channels(doc: &Document, animation: &AnimationSource) -> Vec<AnimationChannel> {
    let mut channels: Vec<AnimationChannel> = animation
        .channels
        .iter()
        .filter_map(|source| AnimationChannel::create(doc, animation, source))
        .collect();
    for child in &animation.children {
        channels.extend(collect_channels(doc, child));
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ChannelSource, ChannelTarget, Node, NodeTransform, SamplerSource};

    #[test]
    fn nested_channels_are_collected_and_bad_ones_dropped() {
        let mut doc = Document::new();
        let node = doc.add_node(
            Node::new("n").with_transform(NodeTransform::translate([0.0; 3])),
            None,
        );
        let sampler = SamplerSource {
            input: vec![0.0, 1.0],
            output: vec![0.0, 1.0],
            ..Default::default()
        };
        let good = ChannelSource {
            sampler: 0,
            target: Some(ChannelTarget { node, transform: 0 }),
            selector: ".X".into(),
        };
        let unresolved = ChannelSource {
            target: None,
            ..good.clone()
        };
        let animation = AnimationSource {
            name: "outer".into(),
            samplers: vec![sampler.clone()],
            channels: vec![good.clone(), unresolved],
            children: vec![AnimationSource {
                name: "inner".into(),
                samplers: vec![sampler],
                channels: vec![good],
                children: vec![],
            }],
        };
        assert_eq!(collect_channels(&doc, &animation).len(), 2);
    }
}
