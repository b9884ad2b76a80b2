//! Canonical k-mer extraction and seeded 64-bit hashing.
//!
//! Grounded in the teacher's `sketch::minhash` k-mer walking and codon
//! translation tables, reorganized into standalone, lazily-evaluated
//! operations per `spec.md` §4.1.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::str;

use murmurhash3::murmurhash3_x64_128;
use once_cell::sync::Lazy;

use crate::Error;

/// Which molecule/alphabet a sketch's k-mers are drawn from.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashFunctions {
    Dna,
    Protein,
    Dayhoff,
    Hp,
}

impl std::fmt::Display for HashFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            HashFunctions::Dna => "DNA",
            HashFunctions::Protein => "protein",
            HashFunctions::Dayhoff => "dayhoff",
            HashFunctions::Hp => "hp",
        };
        write!(f, "{}", s)
    }
}

impl TryFrom<&str> for HashFunctions {
    type Error = Error;

    fn try_from(moltype: &str) -> Result<Self, Self::Error> {
        match moltype.to_lowercase().as_str() {
            "dna" => Ok(HashFunctions::Dna),
            "protein" => Ok(HashFunctions::Protein),
            "dayhoff" => Ok(HashFunctions::Dayhoff),
            "hp" => Ok(HashFunctions::Hp),
            other => Err(Error::invalid_input(format!(
                "unknown molecule type: {other}"
            ))),
        }
    }
}

/// Seeded MurmurHash3 x64/128, truncated to the low 64 bits, as
/// `spec.md` §4.1 requires.
#[inline]
pub fn hash64(kmer: &[u8], seed: u64) -> u64 {
    murmurhash3_x64_128(kmer, seed).0
}

const COMPLEMENT: [u8; 256] = {
    let mut lookup = [0u8; 256];
    lookup[b'A' as usize] = b'T';
    lookup[b'C' as usize] = b'G';
    lookup[b'G' as usize] = b'C';
    lookup[b'T' as usize] = b'A';
    lookup[b'N' as usize] = b'N';
    lookup
};

/// Reverse complement of a DNA sequence. Any byte outside `ACGTN` maps
/// to `\0`; callers must validate before relying on the result.
pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&nt| COMPLEMENT[nt as usize]).collect()
}

fn is_acgt(byte: u8) -> bool {
    matches!(byte, b'A' | b'C' | b'G' | b'T')
}

/// Lazily walks `seq` in windows of length `k`, skipping any window that
/// contains a non-ACGT base, and yields the canonical (lexicographically
/// smaller of forward/reverse-complement) form of each surviving k-mer.
pub struct DnaKmers<'a> {
    seq: &'a [u8],
    rc: Vec<u8>,
    k: usize,
    pos: usize,
}

impl<'a> DnaKmers<'a> {
    pub fn new(seq: &'a [u8], k: usize) -> Self {
        DnaKmers {
            rc: revcomp(seq),
            seq,
            k,
            pos: 0,
        }
    }
}

impl<'a> Iterator for DnaKmers<'a> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        let len = self.seq.len();
        if self.k == 0 || self.k > len {
            return None;
        }
        while self.pos + self.k <= len {
            let i = self.pos;
            self.pos += 1;
            let fwd = &self.seq[i..i + self.k];
            if !fwd.iter().all(|&b| is_acgt(b)) {
                continue;
            }
            let rc = &self.rc[len - self.k - i..len - i];
            return Some(std::cmp::min(fwd, rc).to_vec());
        }
        None
    }
}

/// Sliding window over a protein sequence, skipping windows that
/// contain a stop codon (`*`) or unknown residue (`X`).
pub fn protein_kmers(seq: &[u8], k: usize) -> impl Iterator<Item = &[u8]> {
    seq.windows(k)
        .filter(|w| !w.iter().any(|&b| b == b'*' || b == b'X'))
}

static CODON_TABLE: Lazy<HashMap<&'static str, u8>> = Lazy::new(|| {
    [
        ("TTT", b'F'), ("TTC", b'F'), ("TTA", b'L'), ("TTG", b'L'),
        ("TCT", b'S'), ("TCC", b'S'), ("TCA", b'S'), ("TCG", b'S'), ("TCN", b'S'),
        ("TAT", b'Y'), ("TAC", b'Y'), ("TAA", b'*'), ("TAG", b'*'), ("TGA", b'*'),
        ("TGT", b'C'), ("TGC", b'C'), ("TGG", b'W'),
        ("CTT", b'L'), ("CTC", b'L'), ("CTA", b'L'), ("CTG", b'L'), ("CTN", b'L'),
        ("CCT", b'P'), ("CCC", b'P'), ("CCA", b'P'), ("CCG", b'P'), ("CCN", b'P'),
        ("CAT", b'H'), ("CAC", b'H'), ("CAA", b'Q'), ("CAG", b'Q'),
        ("CGT", b'R'), ("CGC", b'R'), ("CGA", b'R'), ("CGG", b'R'), ("CGN", b'R'),
        ("ATT", b'I'), ("ATC", b'I'), ("ATA", b'I'), ("ATG", b'M'),
        ("ACT", b'T'), ("ACC", b'T'), ("ACA", b'T'), ("ACG", b'T'), ("ACN", b'T'),
        ("AAT", b'N'), ("AAC", b'N'), ("AAA", b'K'), ("AAG", b'K'),
        ("AGT", b'S'), ("AGC", b'S'), ("AGA", b'R'), ("AGG", b'R'),
        ("GTT", b'V'), ("GTC", b'V'), ("GTA", b'V'), ("GTG", b'V'), ("GTN", b'V'),
        ("GCT", b'A'), ("GCC", b'A'), ("GCA", b'A'), ("GCG", b'A'), ("GCN", b'A'),
        ("GAT", b'D'), ("GAC", b'D'), ("GAA", b'E'), ("GAG", b'E'),
        ("GGT", b'G'), ("GGC", b'G'), ("GGA", b'G'), ("GGG", b'G'), ("GGN", b'G'),
    ]
    .iter()
    .cloned()
    .collect()
});

/// Dayhoff reduced-alphabet grouping (Dayhoff et al. 1978, via Peris,
/// Lopez & Campos 2008).
static DAYHOFF_TABLE: Lazy<HashMap<u8, u8>> = Lazy::new(|| {
    [
        (b'C', b'a'),
        (b'A', b'b'), (b'G', b'b'), (b'P', b'b'), (b'S', b'b'), (b'T', b'b'),
        (b'D', b'c'), (b'E', b'c'), (b'N', b'c'), (b'Q', b'c'),
        (b'H', b'd'), (b'K', b'd'), (b'R', b'd'),
        (b'I', b'e'), (b'L', b'e'), (b'M', b'e'), (b'V', b'e'),
        (b'F', b'f'), (b'W', b'f'), (b'Y', b'f'),
    ]
    .iter()
    .cloned()
    .collect()
});

/// Hydrophobic/hydrophilic reduced alphabet (Phillips, Kondev & Theriot 2008).
static HP_TABLE: Lazy<HashMap<u8, u8>> = Lazy::new(|| {
    [
        (b'A', b'h'), (b'F', b'h'), (b'G', b'h'), (b'I', b'h'), (b'L', b'h'),
        (b'M', b'h'), (b'P', b'h'), (b'V', b'h'), (b'W', b'h'), (b'Y', b'h'),
        (b'N', b'p'), (b'C', b'p'), (b'S', b'p'), (b'T', b'p'), (b'D', b'p'),
        (b'E', b'p'), (b'R', b'p'), (b'H', b'p'), (b'K', b'p'), (b'Q', b'p'),
    ]
    .iter()
    .cloned()
    .collect()
});

/// Translates one codon (length 1-3) into its amino acid, `N`-padding
/// incomplete trailing codons the way the teacher does so a truncated
/// final codon degrades to `X` instead of erroring.
pub fn translate_codon(codon: &[u8]) -> Result<u8, Error> {
    match codon.len() {
        1 => Ok(b'X'),
        2 => {
            let mut v = codon.to_vec();
            v.push(b'N');
            let key = str::from_utf8(&v)?;
            Ok(*CODON_TABLE.get(key).unwrap_or(&b'X'))
        }
        3 => {
            let key = str::from_utf8(codon)?;
            Ok(*CODON_TABLE.get(key).unwrap_or(&b'X'))
        }
        other => Err(Error::invalid_input(format!(
            "codon has invalid length: {other}"
        ))),
    }
}

pub fn aa_to_dayhoff(aa: u8) -> u8 {
    *DAYHOFF_TABLE.get(&aa).unwrap_or(&b'X')
}

pub fn aa_to_hp(aa: u8) -> u8 {
    *HP_TABLE.get(&aa).unwrap_or(&b'X')
}

/// Translates a nucleotide stream into amino acids, stopping at (but
/// not including) the first stop codon. `spec.md` §4.1: "stop codons
/// terminate a stretch".
fn translate_stretch(seq: &[u8], reduce: Option<fn(u8) -> u8>) -> Vec<u8> {
    let mut aa = Vec::with_capacity(seq.len() / 3);
    for codon in seq.chunks(3) {
        if codon.len() < 3 {
            break;
        }
        match translate_codon(codon) {
            Ok(b'*') | Err(_) => break,
            Ok(residue) => aa.push(reduce.map_or(residue, |f| f(residue))),
        }
    }
    aa
}

/// Six-frame translation (3 forward + 3 reverse-complement) of a DNA
/// sequence into amino-acid k-mers of length `aa_ksize`, honoring the
/// `dayhoff`/`hp` reduced alphabets. `ksize` (the DNA k-mer size) must
/// be a multiple of 3 (`spec.md` §9 protein-ksize-divisibility rule);
/// `aa_ksize = ksize / 3`.
pub fn six_frame_protein_kmers(seq: &[u8], aa_ksize: usize, dayhoff: bool, hp: bool) -> Vec<Vec<u8>> {
    let reduce: Option<fn(u8) -> u8> = if dayhoff {
        Some(aa_to_dayhoff)
    } else if hp {
        Some(aa_to_hp)
    } else {
        None
    };

    let rc = revcomp(seq);
    let mut kmers = Vec::new();

    for frame in 0..3 {
        for strand in [seq, rc.as_slice()] {
            if frame >= strand.len() {
                continue;
            }
            let shifted = &strand[frame..];
            for stretch in stop_free_stretches(shifted, reduce) {
                if stretch.len() >= aa_ksize {
                    for w in stretch.windows(aa_ksize) {
                        kmers.push(w.to_vec());
                    }
                }
            }
        }
    }

    kmers
}

/// Splits a frame-shifted nucleotide sequence on stop codons, returning
/// the amino-acid translation of each stop-free stretch.
fn stop_free_stretches(seq: &[u8], reduce: Option<fn(u8) -> u8>) -> Vec<Vec<u8>> {
    let mut stretches = Vec::new();
    let mut start = 0;
    while start + 3 <= seq.len() {
        let stretch = translate_stretch(&seq[start..], reduce);
        let consumed_codons = stretch.len() + 1; // +1 for the stop codon (or truncation)
        stretches.push(stretch);
        start += consumed_codons * 3;
    }
    stretches
}

/// Entry point a `MinHash` sketch calls while walking a DNA input
/// record: dispatches to plain canonical-DNA k-mers, or (when the
/// sketch's `hash_function` names a protein alphabet) six-frame
/// translation, per `spec.md` §4.1 "Protein from DNA".
pub fn kmers_from_dna(seq: &[u8], k: usize, moltype: HashFunctions) -> Result<Vec<Vec<u8>>, Error> {
    if seq.len() < k {
        return Err(Error::invalid_input(format!(
            "sequence of length {} shorter than k={}",
            seq.len(),
            k
        )));
    }
    match moltype {
        HashFunctions::Dna => Ok(DnaKmers::new(seq, k).collect()),
        HashFunctions::Protein => {
            let aa_ksize = protein_ksize(k)?;
            Ok(six_frame_protein_kmers(seq, aa_ksize, false, false))
        }
        HashFunctions::Dayhoff => {
            let aa_ksize = protein_ksize(k)?;
            Ok(six_frame_protein_kmers(seq, aa_ksize, true, false))
        }
        HashFunctions::Hp => {
            let aa_ksize = protein_ksize(k)?;
            Ok(six_frame_protein_kmers(seq, aa_ksize, false, true))
        }
    }
}

/// Entry point for a sequence that is already amino acids: sliding
/// window over `seq`, reduced through the requested alphabet, per
/// `spec.md` §4.1 "Protein from protein".
pub fn kmers_from_protein(seq: &[u8], k: usize, moltype: HashFunctions) -> Result<Vec<Vec<u8>>, Error> {
    if seq.len() < k {
        return Err(Error::invalid_input(format!(
            "sequence of length {} shorter than k={}",
            seq.len(),
            k
        )));
    }
    let reduce: Option<fn(u8) -> u8> = match moltype {
        HashFunctions::Protein => None,
        HashFunctions::Dayhoff => Some(aa_to_dayhoff),
        HashFunctions::Hp => Some(aa_to_hp),
        HashFunctions::Dna => {
            return Err(Error::invalid_input(
                "cannot take protein k-mers with moltype DNA",
            ))
        }
    };
    Ok(protein_kmers(seq, k)
        .map(|w| match reduce {
            Some(f) => w.iter().map(|&b| f(b)).collect(),
            None => w.to_vec(),
        })
        .collect())
}

fn protein_ksize(dna_ksize: usize) -> Result<usize, Error> {
    if dna_ksize % 3 != 0 {
        return Err(Error::invalid_input(
            "protein ksize must be a multiple of 3 when translating from DNA",
        ));
    }
    Ok(dna_ksize / 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_kmer_matches_revcomp() {
        let fwd: Vec<_> = DnaKmers::new(b"ATGGA", 5).collect();
        let rc: Vec<_> = DnaKmers::new(b"TCCAT", 5).collect();
        assert_eq!(fwd, rc);
        assert_eq!(fwd.len(), 1);
    }

    #[test]
    fn skips_non_acgt_windows() {
        let kmers: Vec<_> = DnaKmers::new(b"AANTT", 3).collect();
        // windows: AAN (skip), ANT (skip), NTT (skip) -> none survive
        assert!(kmers.is_empty());
    }

    #[test]
    fn hash_is_seed_stable() {
        let h1 = hash64(b"ACGTA", 42);
        let h2 = hash64(b"ACGTA", 42);
        let h3 = hash64(b"ACGTA", 43);
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn protein_kmers_skip_stop_and_unknown() {
        let kmers: Vec<_> = protein_kmers(b"MK*AX", 2).collect();
        // windows: MK (ok), K* (skip), *A (skip), AX (skip)
        assert_eq!(kmers, vec![b"MK".as_slice()]);
    }

    #[test]
    fn six_frame_stops_terminate_stretch() {
        // ATG AAA TAA -> M K * -> one residue stretch "MK" before the stop
        let kmers = six_frame_protein_kmers(b"ATGAAATAA", 2, false, false);
        assert!(kmers.contains(&b"MK".to_vec()));
    }
}
