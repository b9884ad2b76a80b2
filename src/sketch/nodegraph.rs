//! `BitSketch`: the abstract Bloom-filter interface an SBT node stores,
//! plus `Nodegraph`, a concrete multi-table bit-array implementation
//! grounded in the teacher's `sketch::nodegraph::Nodegraph` (itself a
//! port of khmer's `Nodegraph`). The `OXLI` on-disk header and table
//! encoding are kept byte-for-byte identical to the teacher's
//! `save_to_writer`/`from_reader`, since `spec.md` §6 names the same
//! layout; the in-memory shape is reworked behind the `BitSketch` trait
//! so an SBT node can hold either a filter or a leaf sketch uniformly.

use std::io::{Read, Write};
use std::mem::size_of;
use std::slice;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use fixedbitset::FixedBitSet;

use crate::sketch::minhash::MinHash;
use crate::Error;

const OXLI_MAGIC: u32 = 0x4f58_4c49;
const OXLI_VERSION: u8 = 4;
const OXLI_HT_TYPE: u8 = 2;

/// Abstract Bloom filter a SBT node carries. `spec.md` §1/§4.4:
/// `insert`, `contains`, `union_into`, `count_occupied`, `save`/`load`.
pub trait BitSketch: Sized {
    fn insert(&mut self, hash: u64);
    fn contains(&self, hash: u64) -> bool;
    /// Bitwise-ORs `other`'s bits into `self` (parent absorbing child).
    fn union_into(&mut self, other: &Self);
    fn count_occupied(&self) -> usize;
    fn save<W: Write>(&self, writer: &mut W) -> Result<(), Error>;
    fn load<R: Read>(reader: R) -> Result<Self, Error>;
}

/// One hash's worth of membership, spread across `n_tables` prime-sized
/// bit arrays (a standard counting-free Bloom filter).
#[derive(Debug, Default, Clone)]
pub struct Nodegraph {
    tables: Vec<FixedBitSet>,
    ksize: usize,
    occupied_bins: usize,
}

impl PartialEq for Nodegraph {
    fn eq(&self, other: &Nodegraph) -> bool {
        self.tables == other.tables && self.ksize == other.ksize
    }
}

impl Nodegraph {
    pub fn new(tablesizes: &[usize], ksize: usize) -> Nodegraph {
        let tables = tablesizes
            .iter()
            .map(|&size| FixedBitSet::with_capacity(size))
            .collect();
        Nodegraph {
            tables,
            ksize,
            occupied_bins: 0,
        }
    }

    /// Picks `n_tables` distinct prime sizes at or below `tablesize`,
    /// the way the teacher's `with_tables` constructor does.
    pub fn with_tables(tablesize: usize, n_tables: usize, ksize: usize) -> Nodegraph {
        let mut tablesizes = Vec::with_capacity(n_tables);
        let mut candidate = u64::max((tablesize.max(3) - 1) as u64, 2);
        if candidate % 2 == 0 {
            candidate -= 1;
        }
        while tablesizes.len() != n_tables {
            if primal_check::miller_rabin(candidate) {
                tablesizes.push(candidate as usize);
            }
            if candidate <= 1 {
                break;
            }
            candidate -= 2;
        }
        Nodegraph::new(&tablesizes, ksize)
    }

    pub fn ksize(&self) -> usize {
        self.ksize
    }

    pub fn ntables(&self) -> usize {
        self.tables.len()
    }

    pub fn tablesizes(&self) -> Vec<usize> {
        self.tables.iter().map(|t| t.len()).collect()
    }

    pub fn matches(&self, mh: &MinHash) -> usize {
        mh.mins().iter().filter(|&&h| self.contains(h)).count()
    }
}

impl BitSketch for Nodegraph {
    fn insert(&mut self, hash: u64) {
        let mut is_new = false;
        for (i, table) in self.tables.iter_mut().enumerate() {
            let bin = hash % table.len() as u64;
            if !table.put(bin as usize) && i == 0 {
                is_new = true;
            }
        }
        if is_new {
            self.occupied_bins += 1;
        }
    }

    fn contains(&self, hash: u64) -> bool {
        self.tables
            .iter()
            .all(|table| table.contains((hash % table.len() as u64) as usize))
    }

    fn union_into(&mut self, other: &Nodegraph) {
        self.occupied_bins = self
            .tables
            .iter_mut()
            .zip(&other.tables)
            .enumerate()
            .map(|(i, (mine, theirs))| {
                mine.union_with(theirs);
                if i == 0 {
                    mine.count_ones(..)
                } else {
                    0
                }
            })
            .sum();
    }

    fn count_occupied(&self) -> usize {
        self.occupied_bins
    }

    /// `OXLI` magic, version/type bytes, then `ksize`/`n_tables`/
    /// `occupied_bins` header followed by each table's raw bits,
    /// little-endian throughout. `spec.md` §6 "Bloom-filter blob".
    fn save<W: Write>(&self, wtr: &mut W) -> Result<(), Error> {
        wtr.write_all(b"OXLI")?;
        wtr.write_u8(OXLI_VERSION)?;
        wtr.write_u8(OXLI_HT_TYPE)?;
        wtr.write_u32::<LittleEndian>(self.ksize as u32)?;
        wtr.write_u8(self.tables.len() as u8)?;
        wtr.write_u64::<LittleEndian>(self.occupied_bins as u64)?;

        for table in &self.tables {
            let tablesize = table.len();
            wtr.write_u64::<LittleEndian>(tablesize as u64)?;

            let byte_size = tablesize / 8 + 1;
            let (whole_words, remainder) = (byte_size / 4, byte_size % 4);

            let words = &table.as_slice()[..whole_words];
            let bytes = unsafe {
                let len = size_of::<u32>() * words.len();
                slice::from_raw_parts(words.as_ptr() as *const u8, len)
            };
            wtr.write_all(bytes)?;

            if remainder != 0 {
                let mut tail = [0u8; 4];
                LittleEndian::write_u32(&mut tail, table.as_slice()[whole_words]);
                wtr.write_all(&tail[..remainder])?;
            }
        }
        Ok(())
    }

    fn load<R: Read>(reader: R) -> Result<Nodegraph, Error> {
        let (mut rdr, _format) = niffler::get_reader(Box::new(reader))?;

        let magic = rdr.read_u32::<BigEndian>()?;
        if magic != OXLI_MAGIC {
            return Err(Error::corrupt_signature("bad nodegraph magic"));
        }
        let version = rdr.read_u8()?;
        if version != OXLI_VERSION {
            return Err(Error::corrupt_signature(format!(
                "unsupported nodegraph version {version}"
            )));
        }
        let ht_type = rdr.read_u8()?;
        if ht_type != OXLI_HT_TYPE {
            return Err(Error::corrupt_signature("unsupported nodegraph ht_type"));
        }

        let ksize = rdr.read_u32::<LittleEndian>()? as usize;
        let n_tables = rdr.read_u8()?;
        let occupied_bins = rdr.read_u64::<LittleEndian>()? as usize;

        let mut tables = Vec::with_capacity(n_tables as usize);
        for _ in 0..n_tables {
            let tablesize = rdr.read_u64::<LittleEndian>()? as usize;
            let byte_size = tablesize / 8 + 1;
            let remainder = byte_size % 4;

            let mut blocks = vec![0u32; byte_size / 4];
            rdr.read_u32_into::<LittleEndian>(&mut blocks)?;
            if remainder != 0 {
                let mut tail = [0u8; 4];
                rdr.read_exact(&mut tail[..remainder])?;
                blocks.push(LittleEndian::read_u32(&tail));
            }

            tables.push(FixedBitSet::with_capacity_and_blocks(tablesize, blocks));
        }

        Ok(Nodegraph {
            tables,
            ksize,
            occupied_bins,
        })
    }
}

/// Parametric factory bound to `(ksize, tablesize, n_tables)`, grounded
/// in the teacher's `Factory::GraphFactory`. `spec.md` §4.4.
#[derive(Debug, Clone, Copy)]
pub struct NodegraphFactory {
    ksize: usize,
    tablesize: usize,
    n_tables: usize,
}

impl NodegraphFactory {
    pub fn new(ksize: usize, tablesize: usize, n_tables: usize) -> Self {
        NodegraphFactory {
            ksize,
            tablesize,
            n_tables,
        }
    }

    pub fn create(&self) -> Nodegraph {
        Nodegraph::with_tables(self.tablesize, self.n_tables, self.ksize)
    }

    /// ORs every hash of `mh` into a fresh filter. `spec.md` §4.4
    /// `insert_minhash`.
    pub fn from_minhash(&self, mh: &MinHash) -> Nodegraph {
        let mut bs = self.create();
        for &h in mh.mins() {
            bs.insert(h);
        }
        bs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains_roundtrip() {
        let mut ng = Nodegraph::with_tables(1024, 3, 21);
        ng.insert(12345);
        assert!(ng.contains(12345));
        assert_eq!(ng.count_occupied(), 1);
    }

    #[test]
    fn union_into_is_bloom_superset() {
        let mut parent = Nodegraph::with_tables(1024, 3, 21);
        let mut child = Nodegraph::with_tables(1024, 3, 21);
        child.insert(7);
        parent.union_into(&child);
        assert!(parent.contains(7));
    }

    #[test]
    fn save_load_roundtrip() {
        let mut ng = Nodegraph::with_tables(512, 2, 21);
        ng.insert(1);
        ng.insert(99999);
        let mut buf = Vec::new();
        ng.save(&mut buf).unwrap();
        let loaded = Nodegraph::load(&buf[..]).unwrap();
        assert_eq!(ng, loaded);
        assert!(loaded.contains(1));
        assert!(loaded.contains(99999));
    }

    #[test]
    fn from_minhash_contains_every_member() {
        let factory = NodegraphFactory::new(21, 1024, 3);
        let mut mh = MinHash::new(0, 21, crate::hash::HashFunctions::Dna, 42, 1000, false);
        mh.add_many(&[10, 200, 500]);
        let bs = factory.from_minhash(&mh);
        for &h in mh.mins() {
            assert!(bs.contains(h));
        }
    }
}
