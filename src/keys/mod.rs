//! Keystroke catalog, encoding and sampling

pub mod catalog;
mod encoder;
mod modifiers;
mod sampler;

pub use catalog::{find_key, malformed_pool, BaseEncoding, Key, KeyFamily, MalformedSequence, CATALOG, ESC};
pub use encoder::{Category, EncodedInput, Expectation, KeystrokeEncoder};
pub use modifiers::{ModifierPolicy, ModifierSet};
pub use sampler::{
    build_strategy, FamilyWeights, KeystrokeGenerator, SamplingStrategy, StrategyKind,
    UniformCrossProduct, WeightedFamilies, WeightedFamily,
};
