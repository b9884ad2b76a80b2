//! Named container of one or more [`MinHash`] sketches differing in
//! `(ksize, moltype)`, (de)serialized per `spec.md` §4.3/§6's JSON
//! schema. Grounded in the teacher's `signature.rs`, simplified: no
//! `Sketch` enum wrapper (this crate has exactly one sketch kind), no
//! manifest/collection/picklist-CSV machinery (out of scope).

use std::convert::TryFrom;
use std::io::Read;

use serde::de::{Deserializer, Error as DeError};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::hash::HashFunctions;
use crate::selection::{Select, Selection};
use crate::sketch::MinHash;
use crate::{Error, DEFAULT_SEED};

/// Legacy sentinel: a sketch whose `num` field round-trips as this
/// value is actually a scaled sketch with `num == 0`. `spec.md` §4.3.
const LEGACY_NUM_SENTINEL: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, TypedBuilder)]
pub struct Signature {
    #[builder(default)]
    email: String,

    #[builder(default)]
    filename: Option<String>,

    #[builder(default)]
    name: Option<String>,

    #[builder(default = "CC0".to_string())]
    license: String,

    #[builder(default)]
    sketches: Vec<MinHash>,

    #[builder(default = 0.4)]
    version: f64,
}

impl Signature {
    pub fn name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.filename.clone())
            .unwrap_or_else(|| self.md5sum().unwrap_or_default())
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name.into());
    }

    pub fn filename(&self) -> String {
        self.filename.clone().unwrap_or_default()
    }

    pub fn set_filename(&mut self, name: &str) {
        self.filename = Some(name.into());
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn license(&self) -> &str {
        &self.license
    }

    pub fn size(&self) -> usize {
        self.sketches.len()
    }

    pub fn sketches(&self) -> &[MinHash] {
        &self.sketches
    }

    pub fn push(&mut self, sketch: MinHash) {
        self.sketches.push(sketch);
    }

    /// Fails with `AmbiguousSelection` when more than one sketch
    /// remains and the caller needs exactly one. `spec.md` §4.3.
    pub fn md5sum(&self) -> Result<String, Error> {
        match self.sketches.as_slice() {
            [one] => Ok(one.md5sum()),
            [] => Err(Error::ambiguous("signature has no sketches")),
            _ => Err(Error::ambiguous(
                "signature holds multiple sketches; call select first",
            )),
        }
    }

    /// Returns the sole sketch, or `None` if there are zero, panicking
    /// via an explicit error (never silently picking one) when there
    /// is more than one.
    pub fn minhash(&self) -> Result<Option<&MinHash>, Error> {
        match self.sketches.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(one)),
            _ => Err(Error::ambiguous(
                "signature holds multiple sketches; call select first",
            )),
        }
    }

    pub fn from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Vec<Signature>, Error> {
        let reader = std::io::BufReader::new(std::fs::File::open(path)?);
        Signature::from_reader(reader)
    }

    /// Decompresses via the teacher's auto-detecting `niffler` reader,
    /// then streams the top-level JSON array record-by-record with
    /// `serde_json`'s `StreamDeserializer` so a multi-gigabyte
    /// signature file never materializes as one `Vec` in memory before
    /// the caller sees the first record. `spec.md` §4.3/§9.
    pub fn from_reader<R: Read>(rdr: R) -> Result<Vec<Signature>, Error> {
        let (rdr, _format) = niffler::get_reader(Box::new(rdr))?;
        SignatureStream::new(rdr).collect()
    }

    /// Streaming variant of [`Signature::from_reader`] for callers
    /// that want to process records incrementally instead of
    /// collecting them all up front.
    pub fn stream_reader<'a, R: Read + 'a>(
        rdr: R,
    ) -> Result<SignatureStream<Box<dyn Read + 'a>>, Error> {
        let (rdr, _format) = niffler::get_reader(Box::new(rdr))?;
        Ok(SignatureStream::new(rdr))
    }

    /// Flattens every multi-sketch signature into one-sketch-per-record
    /// and filters by `ksize`/`moltype`, matching the teacher's
    /// `load_signatures` helper.
    pub fn load_signatures<R: Read>(
        rdr: R,
        ksize: Option<usize>,
        moltype: Option<HashFunctions>,
    ) -> Result<Vec<Signature>, Error> {
        let mut out = Vec::new();
        for sig in Signature::from_reader(rdr)? {
            for sketch in sig.sketches.iter().cloned() {
                if let Some(k) = ksize {
                    if sketch.ksize() != k {
                        continue;
                    }
                }
                if let Some(m) = moltype {
                    if sketch.hash_function() != m {
                        continue;
                    }
                }
                let mut one = sig.clone();
                one.sketches = vec![sketch];
                out.push(one);
            }
        }
        Ok(out)
    }
}

impl Select for Signature {
    fn select(mut self, selection: &Selection) -> Result<Signature, Error> {
        self.sketches.retain(|mh| {
            selection.ksize().map_or(true, |k| mh.ksize() as u32 == k)
                && selection
                    .moltype()
                    .map_or(true, |m| mh.hash_function() == m)
                && selection.abund().map_or(true, |a| mh.track_abundance() == a)
                && selection.num().map_or(true, |n| mh.num() == n)
                && selection
                    .scaled()
                    .map_or(true, |s| mh.max_hash() == 0 || mh.scaled() == s as u64)
        });
        if self.sketches.len() > 1 {
            return Err(Error::ambiguous(
                "selection matched more than one sketch; narrow ksize/moltype/scaled further",
            ));
        }
        Ok(self)
    }
}

/// Lazily parses one JSON object at a time out of the top-level array
/// of a signature document.
pub struct SignatureStream<R: Read> {
    inner: serde_json::StreamDeserializer<'static, serde_json::de::IoRead<ArrayElements<R>>, RawSignature>,
}

impl<R: Read> SignatureStream<R> {
    fn new(rdr: R) -> Self {
        // `StreamDeserializer` parses whitespace-separated top-level
        // values; a JSON array's elements are not top-level values, so
        // we strip the enclosing `[`/`]` with a small adapter reader.
        let deser = serde_json::Deserializer::from_reader(ArrayElements::new(rdr));
        SignatureStream {
            inner: deser.into_iter(),
        }
    }
}

impl<R: Read> Iterator for SignatureStream<R> {
    type Item = Result<Signature, Error>;

    fn next(&mut self) -> Option<Result<Signature, Error>> {
        self.inner.next().map(|res| {
            res.map_err(Error::from)
                .and_then(RawSignature::into_signature)
        })
    }
}

/// Strips the outer `[`/`]` and top-level `,` separators of a JSON
/// array so each element can be fed to `StreamDeserializer` as its own
/// top-level value, without ever buffering the whole array. Tracks
/// object/array nesting depth and string/escape state so commas and
/// brackets *inside* a record (e.g. the `mins` array) pass through
/// untouched — only separators between top-level array elements are
/// rewritten to whitespace.
struct ArrayElements<R: Read> {
    inner: R,
    started: bool,
    done: bool,
    depth: u32,
    in_string: bool,
    escaped: bool,
}

impl<R: Read> ArrayElements<R> {
    fn new(inner: R) -> Self {
        ArrayElements {
            inner,
            started: false,
            done: false,
            depth: 0,
            in_string: false,
            escaped: false,
        }
    }
}

impl<R: Read> Read for ArrayElements<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        loop {
            let mut byte = [0u8; 1];
            let n = self.inner.read(&mut byte)?;
            if n == 0 {
                self.done = true;
                return Ok(0);
            }
            let c = byte[0];

            if !self.started {
                if c == b'[' || c.is_ascii_whitespace() {
                    continue;
                }
                self.started = true;
            }

            if self.in_string {
                buf[0] = c;
                if self.escaped {
                    self.escaped = false;
                } else if c == b'\\' {
                    self.escaped = true;
                } else if c == b'"' {
                    self.in_string = false;
                }
                return Ok(1);
            }

            match c {
                b'"' => {
                    self.in_string = true;
                    buf[0] = c;
                    return Ok(1);
                }
                b'{' | b'[' => {
                    self.depth += 1;
                    buf[0] = c;
                    return Ok(1);
                }
                b'}' | b']' if self.depth > 0 => {
                    self.depth -= 1;
                    buf[0] = c;
                    return Ok(1);
                }
                b',' | b']' if self.depth == 0 => {
                    // Top-level separator/close of the outer array:
                    // surface a harmless space so StreamDeserializer
                    // sees a value boundary between independent
                    // top-level values.
                    buf[0] = b' ';
                    if c == b']' {
                        self.done = true;
                    }
                    return Ok(1);
                }
                _ => {
                    buf[0] = c;
                    return Ok(1);
                }
            }
        }
    }
}

/// Wire shape of one signature record, matching `spec.md` §4.3/§6
/// exactly, kept separate from [`Signature`] so `serde` only ever sees
/// flat, independent structs per sketch.
#[derive(Serialize, Deserialize, Debug)]
struct RawSignature {
    #[serde(default = "default_class")]
    class: String,
    #[serde(default)]
    email: String,
    #[serde(rename = "hash_function", default = "default_hash_function")]
    hash_function: String,
    filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default = "default_license")]
    license: String,
    signatures: Vec<RawSketch>,
    #[serde(default = "default_version")]
    version: f64,
}

#[derive(Serialize, Deserialize, Debug)]
struct RawSketch {
    ksize: u32,
    #[serde(default)]
    num: u32,
    #[serde(default)]
    max_hash: u64,
    #[serde(default = "default_seed")]
    seed: u64,
    molecule: String,
    mins: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    abundances: Option<Vec<u64>>,
    md5sum: String,
}

fn default_class() -> String {
    "sourmash_signature".to_string()
}
fn default_license() -> String {
    "CC0".to_string()
}
fn default_version() -> f64 {
    0.4
}
fn default_hash_function() -> String {
    "0.murmur64".to_string()
}
fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl RawSignature {
    fn into_signature(self) -> Result<Signature, Error> {
        let mut sketches = Vec::with_capacity(self.signatures.len());
        for raw in self.signatures {
            sketches.push(raw.into_minhash()?);
        }
        Ok(Signature {
            email: self.email,
            filename: self.filename,
            name: self.name,
            license: self.license,
            sketches,
            version: self.version,
        })
    }
}

impl RawSketch {
    fn into_minhash(self) -> Result<MinHash, Error> {
        let num = if self.num == LEGACY_NUM_SENTINEL {
            0
        } else {
            self.num
        };
        let hash_function = HashFunctions::try_from(self.molecule.as_str())?;
        let track_abundance = self.abundances.is_some();

        let mut mh = MinHash::new(num, self.ksize, hash_function, self.seed, self.max_hash, track_abundance);
        if let Some(abunds) = self.abundances {
            if abunds.len() != self.mins.len() {
                return Err(Error::corrupt_signature(
                    "mins and abundances length mismatch",
                ));
            }
            let mut paired: Vec<(u64, u64)> = self.mins.into_iter().zip(abunds).collect();
            paired.sort_unstable_by_key(|&(h, _)| h);
            mh.add_many_with_abund(&paired);
        } else {
            let mut mins = self.mins;
            mins.sort_unstable();
            mh.add_many(&mins);
        }

        if mh.md5sum() != self.md5sum {
            return Err(Error::corrupt_signature(format!(
                "md5sum mismatch: expected {}, computed {}",
                self.md5sum,
                mh.md5sum()
            )));
        }
        Ok(mh)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Signature", 7)?;
        state.serialize_field("class", "sourmash_signature")?;
        state.serialize_field("email", &self.email)?;
        state.serialize_field("hash_function", "0.murmur64")?;
        state.serialize_field("filename", &self.filename)?;
        if let Some(name) = &self.name {
            state.serialize_field("name", name)?;
        }
        state.serialize_field("license", &self.license)?;
        let raw_sketches: Vec<RawSketch> = self
            .sketches
            .iter()
            .map(|mh| RawSketch {
                ksize: mh.ksize() as u32,
                num: if mh.num() == 0 {
                    LEGACY_NUM_SENTINEL
                } else {
                    mh.num()
                },
                max_hash: mh.max_hash(),
                seed: mh.seed(),
                molecule: mh.hash_function().to_string(),
                mins: mh.mins().to_vec(),
                abundances: mh.abunds().map(|a| a.to_vec()),
                md5sum: mh.md5sum(),
            })
            .collect();
        state.serialize_field("signatures", &raw_sketches)?;
        state.serialize_field("version", &self.version)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Signature, D::Error> {
        let raw = RawSignature::deserialize(deserializer)?;
        raw.into_signature().map_err(DeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json(mins: &[u64]) -> String {
        let mut mh = MinHash::new(0, 21, HashFunctions::Dna, DEFAULT_SEED, 1000, false);
        mh.add_many(mins);
        format!(
            r#"[{{"class":"sourmash_signature","email":"","hash_function":"0.murmur64","filename":null,"license":"CC0","signatures":[{{"ksize":21,"num":4294967295,"max_hash":1000,"seed":42,"molecule":"DNA","mins":{:?},"md5sum":"{}"}}],"version":0.4}}]"#,
            mh.mins(),
            mh.md5sum()
        )
    }

    #[test]
    fn round_trips_through_json() {
        let json = sample_json(&[1, 2, 3]);
        let sigs = Signature::from_reader(json.as_bytes()).unwrap();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].sketches()[0].mins(), &[1, 2, 3]);
    }

    #[test]
    fn rejects_bad_md5sum() {
        let good = sample_json(&[1, 2, 3]);
        let real_md5 = Signature::from_reader(good.as_bytes()).unwrap()[0].sketches()[0].md5sum();
        let corrupted = good.replacen(&real_md5, "0000000000000000000000000000000", 1);
        assert!(Signature::from_reader(corrupted.as_bytes()).is_err());
    }

    #[test]
    fn streaming_yields_each_record_independently() {
        let one = sample_json(&[1]);
        let two = sample_json(&[2]);
        let combined = format!(
            "[{},{}]",
            &one[1..one.len() - 1],
            &two[1..two.len() - 1]
        );
        let sigs: Vec<_> = Signature::stream_reader(combined.as_bytes())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(sigs.len(), 2);
    }
}
