//! Random input selection over the key catalog
//!
//! Two strategies share one encoder: a uniform draw over the full key x
//! modifier cross-product, and a weighted draw over coarse input families.

use super::catalog::{keys_in, malformed_pool, Key, KeyFamily, MalformedSequence, CATALOG};
use super::encoder::{Category, EncodedInput, KeystrokeEncoder};
use super::modifiers::ModifierSet;
use crate::error::HarnessError;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Families of the weighted sampling mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightedFamily {
    /// Printable ASCII: letters, digits, punctuation, optionally shifted
    Ascii,
    /// Ctrl+letter control codes
    Ctrl,
    /// Unmodified F1-F12
    Function,
    /// F1-F12 with Shift, Alt, Ctrl or Ctrl+Alt
    FunctionMod,
    /// Unmodified navigation keys
    Navigation,
    /// Alt + printable character
    AltCombo,
    /// Entries from the malformed pool
    Malformed,
}

impl WeightedFamily {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Ctrl => "ctrl",
            Self::Function => "function",
            Self::FunctionMod => "function_mod",
            Self::Navigation => "navigation",
            Self::AltCombo => "alt_combo",
            Self::Malformed => "malformed",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Malformed => Category::Malformed,
            other => Category::Weighted(*other),
        }
    }
}

/// Percentage weights of the weighted mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyWeights {
    pub ascii: u32,
    pub ctrl: u32,
    pub function: u32,
    pub function_mod: u32,
    pub navigation: u32,
    pub alt_combo: u32,
    pub malformed: u32,
}

impl Default for FamilyWeights {
    fn default() -> Self {
        Self {
            ascii: 40,
            ctrl: 15,
            function: 15,
            function_mod: 10,
            navigation: 10,
            alt_combo: 5,
            malformed: 5,
        }
    }
}

impl FamilyWeights {
    pub fn entries(&self) -> [(WeightedFamily, u32); 7] {
        [
            (WeightedFamily::Ascii, self.ascii),
            (WeightedFamily::Ctrl, self.ctrl),
            (WeightedFamily::Function, self.function),
            (WeightedFamily::FunctionMod, self.function_mod),
            (WeightedFamily::Navigation, self.navigation),
            (WeightedFamily::AltCombo, self.alt_combo),
            (WeightedFamily::Malformed, self.malformed),
        ]
    }
}

/// Which sampling strategy a campaign uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Weighted draw over input families
    #[default]
    Weighted,
    /// Uniform draw over every key and modifier combination
    Uniform,
}

/// A distribution over encoded inputs
pub trait SamplingStrategy: Send {
    /// Short name for logs and reports
    fn name(&self) -> &'static str;

    /// Draw one input
    fn sample(&self, encoder: &KeystrokeEncoder, rng: &mut StdRng) -> EncodedInput;
}

fn pick<'a, T>(items: &'a [T], rng: &mut StdRng) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

/// Uniform key x modifier draw, with an optional share of malformed inputs
pub struct UniformCrossProduct {
    malformed_share: f64,
    pool: Vec<MalformedSequence>,
}

impl UniformCrossProduct {
    pub fn new(malformed_share: f64) -> Self {
        Self {
            malformed_share: malformed_share.clamp(0.0, 1.0),
            pool: malformed_pool(),
        }
    }
}

impl SamplingStrategy for UniformCrossProduct {
    fn name(&self) -> &'static str {
        "uniform"
    }

    fn sample(&self, encoder: &KeystrokeEncoder, rng: &mut StdRng) -> EncodedInput {
        if self.malformed_share > 0.0 && rng.gen_bool(self.malformed_share) {
            return encoder.malformed(pick(&self.pool, rng));
        }
        let key = pick(CATALOG, rng);
        let mods = *pick(&ModifierSet::ALL, rng);
        encoder.encode(key, mods)
    }
}

const FUNCTION_MODIFIERS: [ModifierSet; 4] = [
    ModifierSet::SHIFT,
    ModifierSet::ALT,
    ModifierSet::CTRL,
    ModifierSet::CTRL_ALT,
];

/// Weighted draw over [`WeightedFamily`], then a concrete instance within it
pub struct WeightedFamilies {
    families: Vec<WeightedFamily>,
    index: WeightedIndex<u32>,
    printable: Vec<&'static Key>,
    letters: Vec<&'static Key>,
    function: Vec<&'static Key>,
    navigation: Vec<&'static Key>,
    pool: Vec<MalformedSequence>,
}

impl WeightedFamilies {
    pub fn new(weights: &FamilyWeights) -> Result<Self, HarnessError> {
        let entries = weights.entries();
        let index = WeightedIndex::new(entries.iter().map(|(_, w)| *w))
            .map_err(|e| HarnessError::Usage(format!("invalid family weights: {}", e)))?;

        Ok(Self {
            families: entries.iter().map(|(f, _)| *f).collect(),
            index,
            printable: CATALOG.iter().filter(|k| k.family.is_printable()).collect(),
            letters: keys_in(KeyFamily::Letter).collect(),
            function: keys_in(KeyFamily::Function).collect(),
            navigation: keys_in(KeyFamily::Navigation).collect(),
            pool: malformed_pool(),
        })
    }

    fn instance(
        &self,
        family: WeightedFamily,
        encoder: &KeystrokeEncoder,
        rng: &mut StdRng,
    ) -> EncodedInput {
        let (key, mods) = match family {
            WeightedFamily::Malformed => return encoder.malformed(pick(&self.pool, rng)),
            WeightedFamily::Ascii => (
                *pick(&self.printable, rng),
                *pick(&[ModifierSet::NONE, ModifierSet::SHIFT], rng),
            ),
            WeightedFamily::Ctrl => (*pick(&self.letters, rng), ModifierSet::CTRL),
            WeightedFamily::Function => (*pick(&self.function, rng), ModifierSet::NONE),
            WeightedFamily::FunctionMod => {
                (*pick(&self.function, rng), *pick(&FUNCTION_MODIFIERS, rng))
            }
            WeightedFamily::Navigation => (*pick(&self.navigation, rng), ModifierSet::NONE),
            WeightedFamily::AltCombo => (
                *pick(&self.printable, rng),
                *pick(&[ModifierSet::ALT, ModifierSet::SHIFT_ALT], rng),
            ),
        };
        encoder.encode(key, mods).with_category(family.category())
    }
}

impl SamplingStrategy for WeightedFamilies {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn sample(&self, encoder: &KeystrokeEncoder, rng: &mut StdRng) -> EncodedInput {
        let family = self.families[self.index.sample(rng)];
        self.instance(family, encoder, rng)
    }
}

/// Build the strategy named by `kind`
pub fn build_strategy(
    kind: StrategyKind,
    weights: &FamilyWeights,
    malformed_share: f64,
) -> Result<Box<dyn SamplingStrategy>, HarnessError> {
    Ok(match kind {
        StrategyKind::Weighted => Box::new(WeightedFamilies::new(weights)?),
        StrategyKind::Uniform => Box::new(UniformCrossProduct::new(malformed_share)),
    })
}

/// Encoder + strategy + seeded RNG
pub struct KeystrokeGenerator {
    encoder: KeystrokeEncoder,
    strategy: Box<dyn SamplingStrategy>,
    rng: StdRng,
    seed: u64,
}

impl KeystrokeGenerator {
    /// Create a generator; a missing seed is drawn from the OS
    pub fn new(
        encoder: KeystrokeEncoder,
        strategy: Box<dyn SamplingStrategy>,
        seed: Option<u64>,
    ) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self {
            encoder,
            strategy,
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed that reproduces this generator's sequence
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn encoder(&self) -> &KeystrokeEncoder {
        &self.encoder
    }

    /// Draw the next input
    pub fn next_input(&mut self) -> EncodedInput {
        self.strategy.sample(&self.encoder, &mut self.rng)
    }
}
