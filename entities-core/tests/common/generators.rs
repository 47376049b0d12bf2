//! Stochastic entities generators
//!
//! Uses seeded RNG for reproducibility. Print seed on failure for replay.
//! Everything generated here is in canonical form, so it must survive a
//! parse/serialize round trip byte for byte.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A property inside a definition body.
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    Leaf { name: String, value: String },
    Object { name: String, props: Vec<Prop> },
    Comment(String),
}

/// An entity with a single entityDef.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityModel {
    pub def_name: String,
    pub props: Vec<Prop>,
}

/// Seeded generator for reproducible stochastic tests
pub struct Gen {
    pub rng: StdRng,
    pub seed: u64,
    counter: usize,
}

impl Gen {
    /// Create with specific seed (for reproduction)
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), seed, counter: 0 }
    }

    /// Create from environment or random seed
    #[allow(dead_code)]
    pub fn from_env_or_random() -> Self {
        let seed = std::env::var("ENTITIES_TEST_SEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(rand::random);
        Self::new(seed)
    }

    /// Geometric distribution: count until rand > alpha
    pub fn geometric(&mut self, alpha: f64) -> usize {
        let mut n = 0;
        while self.rng.gen::<f64>() < alpha {
            n += 1;
        }
        n
    }

    /// Random boolean with probability p
    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.gen::<f64>() < p
    }

    /// Identifier that is never a keyword and never repeats
    pub fn unique_name(&mut self) -> String {
        let len = 1 + self.geometric(0.5);
        let mut name = String::with_capacity(len + 4);
        name.push(self.rng.gen_range(b'a'..=b'z') as char);
        let chars = b"abcdefghijklmnopqrstuvwxyz0123456789_";
        for _ in 1..len {
            name.push(chars[self.rng.gen_range(0..chars.len())] as char);
        }
        self.counter += 1;
        format!("{name}_{}", self.counter)
    }

    pub fn value(&mut self) -> String {
        match self.rng.gen_range(0..5) {
            0 => self.rng.gen_range(-100i32..1000).to_string(),
            1 => format!("{:.2}", self.rng.gen_range(-10.0f64..10.0)),
            2 => format!("\"{}\"", self.unique_name()),
            3 => ["true", "false", "NULL"][self.rng.gen_range(0..3)].to_string(),
            _ => format!("{}e-0{}", self.rng.gen_range(1..9), self.rng.gen_range(1..9)),
        }
    }

    pub fn comment(&mut self) -> String {
        format!("// {}", self.unique_name())
    }

    pub fn props(&mut self, depth: usize) -> Vec<Prop> {
        let count = self.geometric(0.75);
        (0..count)
            .map(|_| {
                if depth < 3 && self.chance(0.2) {
                    Prop::Object { name: self.unique_name(), props: self.props(depth + 1) }
                } else if self.chance(0.1) {
                    Prop::Comment(self.comment())
                } else {
                    Prop::Leaf { name: self.unique_name(), value: self.value() }
                }
            })
            .collect()
    }

    pub fn entity(&mut self) -> EntityModel {
        EntityModel { def_name: self.unique_name(), props: self.props(0) }
    }

    pub fn entities(&mut self) -> Vec<EntityModel> {
        (0..1 + self.geometric(0.8)).map(|_| self.entity()).collect()
    }

    /// A document with comments, trailing comments, layers, lists and
    /// single-line objects.
    pub fn document(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        if self.chance(0.5) {
            out.extend_from_slice(b"Version 7\nHierarchyVersion 1\n");
        }
        for _ in 0..1 + self.geometric(0.7) {
            if self.chance(0.2) {
                out.extend_from_slice(self.comment().as_bytes());
                out.push(b'\n');
            }
            out.extend_from_slice(b"entity {\n");
            if self.chance(0.3) {
                out.extend_from_slice(format!("\tinstanceId = {};\n", self.rng.gen_range(0..4)).as_bytes());
            }
            if self.chance(0.3) {
                out.extend_from_slice(b"\tlayers {\n");
                for _ in 0..1 + self.geometric(0.5) {
                    out.extend_from_slice(format!("\t\t\"{}\"\n", self.unique_name()).as_bytes());
                }
                out.extend_from_slice(b"\t}\n");
            }
            out.extend_from_slice(format!("\tentityDef {} {{\n", self.unique_name()).as_bytes());
            let props = self.props(0);
            write_props(&props, 2, &mut out);
            if self.chance(0.4) {
                self.list(2, &mut out);
            }
            if self.chance(0.2) {
                let name = self.unique_name();
                out.extend_from_slice(format!("\t\t{name} = 1; {}\n", self.comment()).as_bytes());
            }
            if self.chance(0.2) {
                let (name, field, value) = (self.unique_name(), self.unique_name(), self.value());
                out.extend_from_slice(format!("\t\t{name} = {{ {field} = {value}; }}\n").as_bytes());
            }
            out.extend_from_slice(b"\t}\n}\n");
        }
        out
    }

    /// A list object, possibly with stale numbering and no `num`.
    pub fn list(&mut self, depth: usize, out: &mut Vec<u8>) {
        let indent = "\t".repeat(depth);
        let count = self.geometric(0.7);
        out.extend_from_slice(format!("{indent}{} = {{\n", self.unique_name()).as_bytes());
        if self.chance(0.5) {
            out.extend_from_slice(format!("{indent}\tnum = {};\n", self.rng.gen_range(0..5)).as_bytes());
        }
        for _ in 0..count {
            let index = self.rng.gen_range(0..10);
            out.extend_from_slice(format!("{indent}\titem[{index}] = {};\n", self.value()).as_bytes());
        }
        out.extend_from_slice(format!("{indent}}}\n").as_bytes());
    }
}

pub fn write_props(props: &[Prop], depth: usize, out: &mut Vec<u8>) {
    let indent = "\t".repeat(depth);
    for prop in props {
        match prop {
            Prop::Leaf { name, value } => out.extend_from_slice(format!("{indent}{name} = {value};\n").as_bytes()),
            Prop::Comment(text) => out.extend_from_slice(format!("{indent}{text}\n").as_bytes()),
            Prop::Object { name, props } => {
                out.extend_from_slice(format!("{indent}{name} = {{\n").as_bytes());
                write_props(props, depth + 1, out);
                out.extend_from_slice(format!("{indent}}}\n").as_bytes());
            }
        }
    }
}

/// Render entity models as a canonical document.
pub fn render(entities: &[EntityModel]) -> Vec<u8> {
    let mut out = Vec::new();
    for entity in entities {
        out.extend_from_slice(format!("entity {{\n\tentityDef {} {{\n", entity.def_name).as_bytes());
        write_props(&entity.props, 2, &mut out);
        out.extend_from_slice(b"\t}\n}\n");
    }
    out
}

/// Apply random deletions, insertions and value edits to a model.
///
/// Surviving items keep their relative order, which is what a diff can
/// express.
pub fn mutate(gen: &mut Gen, entities: &[EntityModel]) -> Vec<EntityModel> {
    let mut out = Vec::new();
    for entity in entities {
        if gen.chance(0.15) {
            continue;
        }
        if gen.chance(0.15) {
            out.push(gen.entity());
        }
        let mut entity = entity.clone();
        if gen.chance(0.5) {
            entity.props = mutate_props(gen, &entity.props, 0);
        }
        out.push(entity);
    }
    if gen.chance(0.3) {
        out.push(gen.entity());
    }
    out
}

fn mutate_props(gen: &mut Gen, props: &[Prop], depth: usize) -> Vec<Prop> {
    let mut out = Vec::new();
    for prop in props {
        if gen.chance(0.1) {
            out.push(Prop::Leaf { name: gen.unique_name(), value: gen.value() });
        }
        if gen.chance(0.15) {
            continue;
        }
        out.push(match prop {
            Prop::Leaf { name, .. } if gen.chance(0.3) => Prop::Leaf { name: name.clone(), value: gen.value() },
            Prop::Object { name, props } => Prop::Object { name: name.clone(), props: mutate_props(gen, props, depth + 1) },
            other => other.clone(),
        });
    }
    if gen.chance(0.2) {
        out.push(Prop::Leaf { name: gen.unique_name(), value: gen.value() });
    }
    if depth < 2 && gen.chance(0.1) {
        out.push(Prop::Object { name: gen.unique_name(), props: gen.props(depth + 1) });
    }
    out
}
