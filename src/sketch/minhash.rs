//! Bottom-k / scaled-fraction MinHash sketch with optional abundance
//! tracking, grounded in the teacher's `KmerMinHash` (the `Vec`-backed
//! variant; `KmerMinHashBTree` is not carried — one sorted-vector
//! representation covers every invariant `spec.md` §3/§4.2 names).

use std::cmp::Ordering;
use std::f64::consts::PI;
use std::fmt::Write as _;
use std::iter::Peekable;
use std::sync::Mutex;

use typed_builder::TypedBuilder;

use crate::hash::{hash64, kmers_from_dna, kmers_from_protein, HashFunctions};
use crate::{Error, DEFAULT_SEED, MAX_HASH};

/// `scaled = floor(MAX_HASH / max_hash)`, the inverse of
/// [`max_hash_for_scaled`]. `spec.md` §3.
pub fn scaled_for_max_hash(max_hash: u64) -> u64 {
    match max_hash {
        0 => 0,
        _ => MAX_HASH / max_hash,
    }
}

/// `max_hash = floor(MAX_HASH / scaled)`. `scaled=1` keeps every hash.
pub fn max_hash_for_scaled(scaled: u64) -> Option<u64> {
    match scaled {
        0 => None,
        1 => Some(MAX_HASH),
        _ => Some((MAX_HASH as f64 / scaled as f64) as u64),
    }
}

/// A bottom-k or scaled-fraction MinHash sketch over canonical k-mers
/// of a single `(ksize, moltype)`. Exactly one of `num` (bottom-k,
/// `max_hash == 0`) or `max_hash` (scaled, `num == 0`) is nonzero.
#[derive(Debug, TypedBuilder)]
pub struct MinHash {
    num: u32,
    ksize: u32,

    #[builder(setter(into), default = HashFunctions::Dna)]
    hash_function: HashFunctions,

    #[builder(default = DEFAULT_SEED)]
    seed: u64,

    #[builder(default = 0)]
    max_hash: u64,

    #[builder(default)]
    mins: Vec<u64>,

    #[builder(default)]
    abunds: Option<Vec<u64>>,

    #[builder(default)]
    md5sum: Mutex<Option<String>>,
}

impl Clone for MinHash {
    fn clone(&self) -> Self {
        MinHash {
            num: self.num,
            ksize: self.ksize,
            hash_function: self.hash_function,
            seed: self.seed,
            max_hash: self.max_hash,
            mins: self.mins.clone(),
            abunds: self.abunds.clone(),
            md5sum: Mutex::new(Some(self.md5sum())),
        }
    }
}

impl PartialEq for MinHash {
    fn eq(&self, other: &MinHash) -> bool {
        self.ksize == other.ksize
            && self.hash_function == other.hash_function
            && self.seed == other.seed
            && self.num == other.num
            && self.max_hash == other.max_hash
            && self.md5sum() == other.md5sum()
    }
}

impl MinHash {
    pub fn new(
        num: u32,
        ksize: u32,
        hash_function: HashFunctions,
        seed: u64,
        max_hash: u64,
        track_abundance: bool,
    ) -> MinHash {
        let capacity = if num > 0 { num as usize } else { 1000 };
        MinHash {
            num,
            ksize,
            hash_function,
            seed,
            max_hash,
            mins: Vec::with_capacity(capacity),
            abunds: if track_abundance {
                Some(Vec::with_capacity(capacity))
            } else {
                None
            },
            md5sum: Mutex::new(None),
        }
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn ksize(&self) -> usize {
        self.ksize as usize
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn max_hash(&self) -> u64 {
        self.max_hash
    }

    pub fn scaled(&self) -> u64 {
        scaled_for_max_hash(self.max_hash)
    }

    pub fn hash_function(&self) -> HashFunctions {
        self.hash_function
    }

    pub fn is_dna(&self) -> bool {
        self.hash_function == HashFunctions::Dna
    }

    pub fn track_abundance(&self) -> bool {
        self.abunds.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.mins.is_empty()
    }

    pub fn size(&self) -> usize {
        self.mins.len()
    }

    pub fn mins(&self) -> &[u64] {
        &self.mins
    }

    pub fn abunds(&self) -> Option<&[u64]> {
        self.abunds.as_deref()
    }

    pub fn to_vec_abunds(&self) -> Vec<(u64, u64)> {
        match &self.abunds {
            Some(abunds) => self.mins.iter().copied().zip(abunds.iter().copied()).collect(),
            None => self.mins.iter().copied().zip(std::iter::repeat(1)).collect(),
        }
    }

    /// Only permitted while empty; mirrors the teacher's
    /// `set_hash_function`/`enable_abundance` precondition.
    pub fn enable_abundance(&mut self) -> Result<(), Error> {
        if !self.mins.is_empty() {
            return Err(Error::NonEmptySketch {
                field: "track_abundance".into(),
            });
        }
        self.abunds = Some(Vec::new());
        Ok(())
    }

    pub fn disable_abundance(&mut self) -> Result<(), Error> {
        if !self.mins.is_empty() {
            return Err(Error::NonEmptySketch {
                field: "track_abundance".into(),
            });
        }
        self.abunds = None;
        Ok(())
    }

    fn reset_md5sum(&self) {
        let mut data = self.md5sum.lock().unwrap();
        if data.is_some() {
            *data = None;
        }
    }

    /// md5 over the ASCII-decimal concatenation of `ksize` followed by
    /// the sorted hash list; depends only on the hash set, never on
    /// abundance. `spec.md` §3.
    pub fn md5sum(&self) -> String {
        let mut data = self.md5sum.lock().unwrap();
        if data.is_none() {
            let mut buffer = String::with_capacity(20);
            let mut ctx = md5::Context::new();
            write!(&mut buffer, "{}", self.ksize).unwrap();
            ctx.consume(&buffer);
            buffer.clear();
            for hash in &self.mins {
                write!(&mut buffer, "{}", hash).unwrap();
                ctx.consume(&buffer);
                buffer.clear();
            }
            *data = Some(format!("{:x}", ctx.compute()));
        }
        data.clone().unwrap()
    }

    pub fn check_compatible(&self, other: &MinHash) -> Result<(), Error> {
        if self.ksize != other.ksize {
            return Err(Error::incompatible(format!(
                "ksize mismatch: {} != {}",
                self.ksize, other.ksize
            )));
        }
        if self.hash_function != other.hash_function {
            return Err(Error::incompatible(format!(
                "molecule mismatch: {} != {}",
                self.hash_function, other.hash_function
            )));
        }
        if self.seed != other.seed {
            return Err(Error::incompatible("seed mismatch"));
        }
        if (self.num == 0) != (other.num == 0) {
            return Err(Error::incompatible(
                "cannot compare a bottom-k sketch with a scaled sketch",
            ));
        }
        Ok(())
    }

    pub fn add_hash(&mut self, hash: u64) {
        self.add_hash_with_abundance(hash, 1);
    }

    /// §3/§4.2 insertion rule: scaled mode rejects `hash >= max_hash`;
    /// bottom-k mode keeps at most `num` hashes, admitting a new one
    /// only while there's room or it beats the current max.
    pub fn add_hash_with_abundance(&mut self, hash: u64, abundance: u64) {
        if abundance == 0 {
            return;
        }
        if self.num == 0 && self.max_hash == 0 {
            return;
        }
        if self.max_hash != 0 && hash >= self.max_hash {
            return;
        }

        let current_max = self.mins.last().copied().unwrap_or(u64::MAX);
        let has_room = self.num == 0 || (self.mins.len() as u32) < self.num;

        if !has_room && hash >= current_max {
            return;
        }

        match self.mins.binary_search(&hash) {
            Ok(pos) => {
                if let Some(ref mut abunds) = self.abunds {
                    abunds[pos] += abundance;
                }
            }
            Err(pos) => {
                self.mins.insert(pos, hash);
                if let Some(ref mut abunds) = self.abunds {
                    abunds.insert(pos, abundance);
                }
                if self.num != 0 && self.mins.len() > self.num as usize {
                    self.mins.pop();
                    if let Some(ref mut abunds) = self.abunds {
                        abunds.pop();
                    }
                }
                self.reset_md5sum();
            }
        }
    }

    pub fn add_many(&mut self, hashes: &[u64]) {
        for &h in hashes {
            self.add_hash(h);
        }
    }

    pub fn add_many_with_abund(&mut self, hashes: &[(u64, u64)]) {
        for &(h, a) in hashes {
            self.add_hash_with_abundance(h, a);
        }
    }

    /// Walks `seq` (DNA input) through the k-mer extractor matching
    /// this sketch's `hash_function` and hashes each canonical k-mer.
    /// `spec.md` §4.2: fails with `InvalidInput` when the sequence is
    /// shorter than `ksize`.
    pub fn add_sequence(&mut self, seq: &[u8]) -> Result<(), Error> {
        let upper = seq.to_ascii_uppercase();
        let kmers = kmers_from_dna(&upper, self.ksize as usize, self.hash_function)?;
        for kmer in kmers {
            self.add_hash(hash64(&kmer, self.seed));
        }
        Ok(())
    }

    /// Walks `seq` as amino acids; `spec.md` §4.1 "Protein from
    /// protein".
    pub fn add_protein(&mut self, seq: &[u8]) -> Result<(), Error> {
        let upper = seq.to_ascii_uppercase();
        let kmers = kmers_from_protein(&upper, self.ksize as usize, self.hash_function)?;
        for kmer in kmers {
            self.add_hash(hash64(&kmer, self.seed));
        }
        Ok(())
    }

    /// Union of hash sets respecting the bottom-k cap (keep the
    /// globally smallest `num`); abundances add on overlap.
    /// `spec.md` §4.2.
    pub fn merge(&mut self, other: &MinHash) -> Result<(), Error> {
        self.check_compatible(other)?;

        let mut merged = Vec::with_capacity(self.mins.len() + other.mins.len());
        let mut merged_abunds = Vec::with_capacity(merged.capacity());
        let track = self.abunds.is_some() || other.abunds.is_some();

        let mut a = self.mins.iter().peekable();
        let mut b = other.mins.iter().peekable();
        let a_abund = self.abunds.as_deref().unwrap_or(&[]);
        let b_abund = other.abunds.as_deref().unwrap_or(&[]);
        let mut ai = 0usize;
        let mut bi = 0usize;

        loop {
            match (a.peek(), b.peek()) {
                (Some(&&x), Some(&&y)) => match x.cmp(&y) {
                    Ordering::Less => {
                        merged.push(x);
                        if track {
                            merged_abunds.push(a_abund.get(ai).copied().unwrap_or(1));
                        }
                        a.next();
                        ai += 1;
                    }
                    Ordering::Greater => {
                        merged.push(y);
                        if track {
                            merged_abunds.push(b_abund.get(bi).copied().unwrap_or(1));
                        }
                        b.next();
                        bi += 1;
                    }
                    Ordering::Equal => {
                        merged.push(x);
                        if track {
                            let av = a_abund.get(ai).copied().unwrap_or(1);
                            let bv = b_abund.get(bi).copied().unwrap_or(1);
                            merged_abunds.push(av + bv);
                        }
                        a.next();
                        b.next();
                        ai += 1;
                        bi += 1;
                    }
                },
                (Some(&&x), None) => {
                    merged.push(x);
                    if track {
                        merged_abunds.push(a_abund.get(ai).copied().unwrap_or(1));
                    }
                    a.next();
                    ai += 1;
                }
                (None, Some(&&y)) => {
                    merged.push(y);
                    if track {
                        merged_abunds.push(b_abund.get(bi).copied().unwrap_or(1));
                    }
                    b.next();
                    bi += 1;
                }
                (None, None) => break,
            }
        }

        if self.num != 0 && merged.len() > self.num as usize {
            merged.truncate(self.num as usize);
            merged_abunds.truncate(self.num as usize);
        }

        self.mins = merged;
        self.abunds = if track { Some(merged_abunds) } else { None };
        self.reset_md5sum();
        Ok(())
    }

    fn intersection_iter<'a>(&'a self, other: &'a MinHash) -> Intersection<'a> {
        Intersection::new(self.mins.iter(), other.mins.iter())
    }

    pub fn intersection_size(&self, other: &MinHash) -> Result<u64, Error> {
        self.check_compatible(other)?;
        Ok(self.intersection_iter(other).count() as u64)
    }

    fn union_size(&self, other: &MinHash) -> Result<u64, Error> {
        self.check_compatible(other)?;
        let common = self.intersection_size(other)?;
        Ok(self.mins.len() as u64 + other.mins.len() as u64 - common)
    }

    pub fn jaccard(&self, other: &MinHash) -> Result<f64, Error> {
        self.check_compatible(other)?;
        let union = self.union_size(other)?;
        if union == 0 {
            return Ok(0.0);
        }
        Ok(self.intersection_size(other)? as f64 / union as f64)
    }

    /// Cosine similarity over abundance vectors restricted to A∪B
    /// (missing entries count as 0), mapped through `2*acos(x)/PI`
    /// exactly as the teacher's `angular_similarity` does.
    pub fn angular_similarity(&self, other: &MinHash) -> Result<f64, Error> {
        self.check_compatible(other)?;
        let abunds = self
            .abunds
            .as_ref()
            .ok_or_else(|| Error::incompatible("angular similarity requires abundance tracking"))?;
        let other_abunds = other
            .abunds
            .as_ref()
            .ok_or_else(|| Error::incompatible("angular similarity requires abundance tracking"))?;

        let mut other_iter = other.mins.iter().enumerate().peekable();
        let mut prod: u64 = 0;
        for (i, hash) in self.mins.iter().enumerate() {
            while let Some(&(j, h)) = other_iter.peek() {
                match h.cmp(hash) {
                    Ordering::Less => {
                        other_iter.next();
                    }
                    Ordering::Equal => {
                        prod += abunds[i] * other_abunds[j];
                        break;
                    }
                    Ordering::Greater => break,
                }
            }
        }

        let norm_a = (abunds.iter().map(|&a| a * a).sum::<u64>() as f64).sqrt();
        let norm_b = (other_abunds.iter().map(|&a| a * a).sum::<u64>() as f64).sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return Ok(0.0);
        }
        let cos = f64::min(prod as f64 / (norm_a * norm_b), 1.0);
        Ok(1.0 - 2.0 * cos.acos() / PI)
    }

    /// `spec.md` §4.2: auto-downsamples both scaled sketches to
    /// `max(scaled_a, scaled_b)` before comparing; picks Jaccard or
    /// angular similarity depending on `ignore_abundance`.
    pub fn similarity(&self, other: &MinHash, ignore_abundance: bool) -> Result<f64, Error> {
        if self.max_hash != 0 && other.max_hash != 0 && self.max_hash != other.max_hash {
            let (coarser, finer) = if self.max_hash < other.max_hash {
                (self, other)
            } else {
                (other, self)
            };
            let downsampled = finer.downsample_scaled(coarser.scaled())?;
            return coarser.similarity(&downsampled, ignore_abundance);
        }

        if ignore_abundance || self.abunds.is_none() || other.abunds.is_none() {
            self.jaccard(other)
        } else {
            self.angular_similarity(other)
        }
    }

    /// `|A∩B| / |A|`, scaled-downsampled as `similarity` is.
    pub fn contained_by(&self, other: &MinHash) -> Result<f64, Error> {
        if self.max_hash != 0 && other.max_hash != 0 && self.max_hash != other.max_hash {
            let coarsest_scaled = u64::min(self.scaled(), other.scaled());
            let a = self.downsample_scaled(coarsest_scaled)?;
            let b = other.downsample_scaled(coarsest_scaled)?;
            return a.contained_by(&b);
        }
        self.check_compatible(other)?;
        if self.mins.is_empty() {
            return Ok(0.0);
        }
        Ok(self.intersection_size(other)? as f64 / self.mins.len() as f64)
    }

    /// Drops hashes `>= MAX_HASH/new_scaled`, abundances along with
    /// them. Fails with `IncompatibleSketch` on a bottom-k sketch.
    /// `spec.md` §4.2.
    pub fn downsample_scaled(&self, new_scaled: u64) -> Result<MinHash, Error> {
        if self.num != 0 {
            return Err(Error::incompatible(
                "cannot downsample a bottom-k sketch to a scaled sketch",
            ));
        }
        let new_max_hash = max_hash_for_scaled(new_scaled)
            .ok_or_else(|| Error::invalid_input("scaled must be nonzero"))?;
        let mut new_mh = MinHash::new(
            0,
            self.ksize,
            self.hash_function,
            self.seed,
            new_max_hash,
            self.abunds.is_some(),
        );
        new_mh.add_many_with_abund(&self.to_vec_abunds());
        Ok(new_mh)
    }
}

/// Sorted-merge intersection over two already-sorted, deduplicated
/// slices, matching the teacher's `Intersection` helper.
struct Intersection<'a> {
    left: Peekable<std::slice::Iter<'a, u64>>,
    right: Peekable<std::slice::Iter<'a, u64>>,
}

impl<'a> Intersection<'a> {
    fn new(left: std::slice::Iter<'a, u64>, right: std::slice::Iter<'a, u64>) -> Self {
        Intersection {
            left: left.peekable(),
            right: right.peekable(),
        }
    }
}

impl<'a> Iterator for Intersection<'a> {
    type Item = &'a u64;

    fn next(&mut self) -> Option<&'a u64> {
        loop {
            let (l, r) = match (self.left.peek(), self.right.peek()) {
                (Some(l), Some(r)) => (*l, *r),
                _ => return None,
            };
            match l.cmp(r) {
                Ordering::Less => {
                    self.left.next();
                }
                Ordering::Greater => {
                    self.right.next();
                }
                Ordering::Equal => {
                    self.left.next();
                    self.right.next();
                    return Some(l);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mh(num: u32, ksize: u32, max_hash: u64, track: bool) -> MinHash {
        MinHash::new(num, ksize, HashFunctions::Dna, DEFAULT_SEED, max_hash, track)
    }

    #[test]
    fn bottom_k_cap_and_order() {
        let mut m = mh(3, 21, 0, false);
        for h in [5u64, 1, 9, 2, 8, 3] {
            m.add_hash(h);
        }
        assert_eq!(m.mins(), &[1, 2, 3]);
    }

    #[test]
    fn scaled_mode_rejects_large_hashes() {
        let mut m = mh(0, 21, 100, false);
        m.add_hash(50);
        m.add_hash(150);
        assert_eq!(m.mins(), &[50]);
    }

    #[test]
    fn merge_sums_abundance_on_overlap() {
        let mut a = mh(0, 21, 1000, true);
        let mut b = mh(0, 21, 1000, true);
        a.add_hash_with_abundance(10, 2);
        a.add_hash_with_abundance(20, 1);
        b.add_hash_with_abundance(10, 3);
        b.add_hash_with_abundance(30, 1);
        a.merge(&b).unwrap();
        assert_eq!(a.mins(), &[10, 20, 30]);
        assert_eq!(a.abunds().unwrap(), &[5, 1, 1]);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let mut a = mh(0, 21, 1000, false);
        let mut b = mh(0, 21, 1000, false);
        a.add_hash(1);
        b.add_hash(2);
        assert_eq!(a.jaccard(&b).unwrap(), 0.0);
    }

    #[test]
    fn jaccard_identical_sets_is_one() {
        let mut a = mh(0, 21, 1000, false);
        a.add_many(&[1, 2, 3]);
        let b = a.clone();
        assert_eq!(a.jaccard(&b).unwrap(), 1.0);
    }

    #[test]
    fn md5sum_ignores_abundance() {
        let mut a = mh(0, 21, 1000, true);
        let mut b = mh(0, 21, 1000, false);
        a.add_hash_with_abundance(1, 5);
        b.add_hash(1);
        assert_eq!(a.md5sum(), b.md5sum());
    }

    #[test]
    fn downsample_scaled_drops_large_hashes() {
        let mut a = mh(0, 21, 1000, false);
        a.add_many(&[10, 500, 900]);
        let down = a.downsample_scaled(scaled_for_max_hash(100)).unwrap();
        assert_eq!(down.mins(), &[10]);
    }

    #[test]
    fn check_compatible_rejects_mismatched_ksize() {
        let a = mh(0, 21, 1000, false);
        let b = mh(0, 31, 1000, false);
        assert!(a.check_compatible(&b).is_err());
    }

    #[test]
    fn contained_by_is_intersection_over_self_size() {
        let mut a = mh(0, 21, 1000, false);
        let mut b = mh(0, 21, 1000, false);
        a.add_many(&[1, 2, 3, 4]);
        b.add_many(&[1, 2]);
        assert_eq!(a.contained_by(&b).unwrap(), 0.5);
        assert_eq!(b.contained_by(&a).unwrap(), 1.0);
    }
}
