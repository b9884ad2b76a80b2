//! High-level sketch construction from sequence records.
//!
//! Grounded in the teacher's `cmd.rs` (`ComputeParameters`,
//! `build_template`), generalized away from a CLI-facing
//! `sourmash compute` mirror and onto the `SequenceSource` collaborator
//! `spec.md` §6 names in place of file/FASTA reading (explicitly out of
//! scope, §2 Non-goals).

use getset::{CopyGetters, Getters, Setters};
use typed_builder::TypedBuilder;

use crate::hash::HashFunctions;
use crate::signature::Signature;
use crate::sketch::minhash::max_hash_for_scaled;
use crate::sketch::MinHash;
use crate::Error;

/// A source of sequence records the caller supplies; FASTA/FASTQ
/// parsing itself is out of scope (`spec.md` §2 Non-goals). `spec.md`
/// §6 "Collaborator interfaces consumed by the core".
pub trait SequenceSource {
    /// Iterates `(name, sequence)` pairs. `name` is whatever
    /// identifier the source associates with the record (e.g. a FASTA
    /// header); `sequence` is the raw, untranslated byte sequence.
    fn records(&mut self) -> Box<dyn Iterator<Item = (String, Vec<u8>)> + '_>;
}

/// Parameters controlling which sketches [`compute`] builds from each
/// source. Combinational fields (`ksizes`, `dna`/`dayhoff`/`hp`/
/// `protein`) each add a sketch per k-mer size; the rest apply
/// uniformly to every sketch produced. Grounded in the teacher's
/// `ComputeParameters`.
#[derive(TypedBuilder, CopyGetters, Getters, Setters)]
pub struct ComputeParameters {
    /// K-mer sizes to generate a sketch for.
    #[getset(get = "pub", set = "pub")]
    #[builder(default = vec![21, 31, 51])]
    ksizes: Vec<u32>,

    /// Build nucleotide sketches.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = true)]
    dna: bool,

    /// Build Dayhoff-encoded protein sketches.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    dayhoff: bool,

    /// Build hydrophobic-polar-encoded protein sketches.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    hp: bool,

    /// Build plain protein sketches (translated from DNA unless
    /// `input_is_protein`).
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    protein: bool,

    /// Input sequences are already protein; skip six-frame translation.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    input_is_protein: bool,

    /// Compute one signature per record instead of merging every
    /// record from a source into a single signature.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    singleton: bool,

    /// Choose number of hashes as 1-in-`scaled` of the input k-mers.
    /// Mutually exclusive with `num_hashes` (scaled mode wins when
    /// nonzero, matching [`MinHash`]'s own bottom-k-vs-scaled rule).
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = 0u64)]
    scaled: u64,

    /// Number of hashes to keep per sketch in bottom-k mode.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = 500u32)]
    num_hashes: u32,

    /// Seed used by the underlying `MurmurHash3`.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = 42u64)]
    seed: u64,

    /// Track k-mer abundances in the generated sketches.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    track_abundance: bool,

    /// Name given to every signature this set of parameters produces.
    #[getset(get = "pub", set = "pub")]
    #[builder(default = None)]
    merge: Option<String>,

    /// Signature license field.
    #[getset(get = "pub", set = "pub")]
    #[builder(default = "CC0".into())]
    license: String,
}

impl Default for ComputeParameters {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builds the empty sketch set a [`ComputeParameters`] describes, one
/// per (ksize, moltype) combination. Grounded in the teacher's
/// `build_template`.
pub fn build_template(params: &ComputeParameters) -> Vec<MinHash> {
    let max_hash = max_hash_for_scaled(params.scaled).unwrap_or(0);

    params
        .ksizes
        .iter()
        .flat_map(|&k| {
            let mut sketches = Vec::new();
            let mut push = |moltype: HashFunctions, ksize: u32| {
                sketches.push(MinHash::new(
                    params.num_hashes,
                    ksize,
                    moltype,
                    params.seed,
                    max_hash,
                    params.track_abundance,
                ));
            };

            if params.dna {
                push(HashFunctions::Dna, k);
            }
            if params.protein {
                push(HashFunctions::Protein, k);
            }
            if params.dayhoff {
                push(HashFunctions::Dayhoff, k);
            }
            if params.hp {
                push(HashFunctions::Hp, k);
            }
            sketches
        })
        .collect()
}

fn add_record(sketches: &mut [MinHash], seq: &[u8], input_is_protein: bool) -> Result<(), Error> {
    for mh in sketches.iter_mut() {
        if input_is_protein {
            mh.add_protein(seq)?;
        } else {
            mh.add_sequence(seq)?;
        }
    }
    Ok(())
}

/// Computes one [`Signature`] per source, or one per record when
/// `params.singleton()` is set, each carrying the sketch set
/// [`build_template`] describes. `spec.md` §6 `compute(sources, params)
/// -> [Signature]`.
pub fn compute<S: SequenceSource>(sources: &mut [S], params: &ComputeParameters) -> Result<Vec<Signature>, Error> {
    let mut out = Vec::new();

    for source in sources.iter_mut() {
        if params.singleton() {
            for (name, seq) in source.records() {
                let mut sketches = build_template(params);
                add_record(&mut sketches, &seq, params.input_is_protein())?;
                out.push(
                    Signature::builder()
                        .name(Some(name))
                        .license(params.license().clone())
                        .sketches(sketches)
                        .build(),
                );
            }
        } else {
            let mut sketches = build_template(params);
            let mut first_name = None;
            for (name, seq) in source.records() {
                if first_name.is_none() {
                    first_name = Some(name);
                }
                add_record(&mut sketches, &seq, params.input_is_protein())?;
                log::debug!("added record to {} sketch(es)", sketches.len());
            }
            let name = params.merge().clone().or(first_name);
            out.push(
                Signature::builder()
                    .name(name)
                    .license(params.license().clone())
                    .sketches(sketches)
                    .build(),
            );
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSource(Vec<(String, Vec<u8>)>);

    impl SequenceSource for VecSource {
        fn records(&mut self) -> Box<dyn Iterator<Item = (String, Vec<u8>)> + '_> {
            Box::new(self.0.drain(..))
        }
    }

    #[test]
    fn build_template_respects_combinational_flags() {
        let params = ComputeParameters::builder()
            .ksizes(vec![21, 31])
            .dna(true)
            .protein(true)
            .build();
        let sketches = build_template(&params);
        assert_eq!(sketches.len(), 4);
    }

    #[test]
    fn compute_merges_records_into_one_signature_by_default() {
        let mut sources = vec![VecSource(vec![
            ("r1".into(), b"ACGTACGTACGTACGTACGTACGT".to_vec()),
            ("r2".into(), b"TTTTACGTACGTACGTACGTACGT".to_vec()),
        ])];
        let params = ComputeParameters::builder().ksizes(vec![4]).build();
        let sigs = compute(&mut sources, &params).unwrap();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].sketches().len(), 1);
        assert!(sigs[0].sketches()[0].size() > 0);
    }

    #[test]
    fn compute_singleton_emits_one_signature_per_record() {
        let mut sources = vec![VecSource(vec![
            ("r1".into(), b"ACGTACGTACGTACGTACGTACGT".to_vec()),
            ("r2".into(), b"TTTTACGTACGTACGTACGTACGT".to_vec()),
        ])];
        let params = ComputeParameters::builder().ksizes(vec![4]).singleton(true).build();
        let sigs = compute(&mut sources, &params).unwrap();
        assert_eq!(sigs.len(), 2);
    }
}
