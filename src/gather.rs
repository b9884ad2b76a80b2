//! Greedy containment decomposition of a query sketch against a pool
//! of SBT leaves. `spec.md` §4.10.

use crate::index::sbt::{Leaf, TraversalOrder, SBT};
use crate::sketch::MinHash;
use crate::Error;

/// One round of gather: the leaf that explained the most of `Q0`
/// remaining at that point, plus its scoring fractions. `spec.md`
/// §4.10 step 2.
#[derive(Debug, Clone)]
pub struct GatherRecord {
    pub name: String,
    pub md5: String,
    pub filename: String,
    pub intersect_bp: u64,
    pub f_orig_query: f64,
    pub f_unique_to_query: f64,
    pub f_match: f64,
}

/// Candidate pool handed to [`gather`]: every SBT to search plus any
/// loose signatures outside a tree, per §4.10's "one or more SBTs ...
/// plus optional loose signatures".
#[derive(Default)]
pub struct GatherTargets<'a> {
    pub trees: Vec<&'a SBT>,
    pub loose: Vec<(&'a str, &'a str, &'a MinHash)>,
}

impl<'a> GatherTargets<'a> {
    pub fn new() -> GatherTargets<'a> {
        GatherTargets::default()
    }

    pub fn with_tree(mut self, sbt: &'a SBT) -> Self {
        self.trees.push(sbt);
        self
    }

    pub fn with_loose(mut self, name: &'a str, filename: &'a str, mh: &'a MinHash) -> Self {
        self.loose.push((name, filename, mh));
        self
    }

}

fn intersection_size(a: &[u64], b: &[u64]) -> usize {
    let (mut i, mut j, mut count) = (0usize, 0usize, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}

fn subtract(q: &[u64], m: &[u64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(q.len());
    let mut j = 0;
    for &h in q {
        while j < m.len() && m[j] < h {
            j += 1;
        }
        if j >= m.len() || m[j] != h {
            out.push(h);
        }
    }
    out
}

/// Iteratively decomposes `query` against `targets` until no remaining
/// candidate meets `threshold_bp`, or the query is exhausted. `spec.md`
/// §4.10's full algorithm, including the Bloom-containment bound used
/// to prune SBT subtrees before falling back to exact intersection on
/// survivors.
pub fn gather(query: &MinHash, targets: &GatherTargets, threshold_bp: u64) -> Result<Vec<GatherRecord>, Error> {
    let scaled = query.scaled();
    if scaled == 0 {
        return Err(Error::invalid_input("gather requires a scaled query MinHash"));
    }

    let orig_size = query.size();
    if orig_size == 0 {
        return Ok(Vec::new());
    }

    let orig_mins: Vec<u64> = query.mins().to_vec();
    let mut q: Vec<u64> = orig_mins.clone();
    let mut records = Vec::new();

    loop {
        if q.is_empty() {
            break;
        }
        let bound = threshold_bp as f64 / (scaled as f64 * q.len() as f64);

        // Scratch MinHash holding only the remaining hashes, used
        // purely to drive the Bloom bound over SBT subtrees.
        let q_mh = rebuild_with(query, &q)?;

        let mut prefiltered: Vec<&Leaf> = Vec::new();
        for sbt in &targets.trees {
            prefiltered.extend(sbt.find(&q_mh, bound.min(1.0), true, TraversalOrder::Dfs));
        }

        let mut best: Option<(String, String, usize, usize, Vec<u64>)> = None;
        // Tie-break order: largest intersection, then largest remaining
        // match size, then name ascending.
        let mut consider = |name: &str, filename: &str, mins: &[u64]| {
            let inter = intersection_size(&q, mins);
            if inter == 0 {
                return;
            }
            let better = match &best {
                None => true,
                Some((bname, _, binter, bsize, _)) => {
                    inter > *binter || (inter == *binter && (mins.len() > *bsize || (mins.len() == *bsize && name < bname.as_str())))
                }
            };
            if better {
                best = Some((name.to_string(), filename.to_string(), inter, mins.len(), mins.to_vec()));
            }
        };

        for leaf in &prefiltered {
            if let Ok(mh) = leaf.data() {
                consider(&leaf.name, &leaf.filename, mh.mins());
            }
        }
        for &(name, filename, mh) in &targets.loose {
            consider(name, filename, mh.mins());
        }

        let Some((name, filename, inter, msize, mins)) = best else {
            break;
        };

        let intersect_bp = inter as u64 * scaled as u64;
        if intersect_bp < threshold_bp {
            break;
        }

        let md5 = md5_of_mins(&mins);
        let q0_inter = intersection_size(&orig_mins, &mins);
        log::debug!("gather round {}: {name} explains {intersect_bp} bp", records.len() + 1);
        records.push(GatherRecord {
            name,
            md5,
            filename,
            intersect_bp,
            f_orig_query: q0_inter as f64 / orig_size as f64,
            f_unique_to_query: inter as f64 / orig_size as f64,
            f_match: inter as f64 / msize as f64,
        });

        q = subtract(&q, &mins);
    }

    Ok(records)
}

fn rebuild_with(template: &MinHash, mins: &[u64]) -> Result<MinHash, Error> {
    let mut mh = MinHash::new(
        template.num(),
        template.ksize() as u32,
        template.hash_function(),
        template.seed(),
        template.max_hash(),
        false,
    );
    mh.add_many(mins);
    Ok(mh)
}

fn md5_of_mins(mins: &[u64]) -> String {
    let mut ctx = md5::Context::new();
    for h in mins {
        ctx.consume(h.to_string().as_bytes());
    }
    format!("{:x}", ctx.compute())
}

/// Best single Jaccard match per leaf above `threshold`. `spec.md` §6.
pub fn categorize<'a>(
    leaves: &'a [Leaf],
    sbt: &'a SBT,
    threshold: f64,
) -> Vec<(&'a Leaf, &'a Leaf, f64)> {
    let mut out = Vec::new();
    for query_leaf in leaves {
        let Ok(query_mh) = query_leaf.data() else {
            continue;
        };
        let mut best: Option<(&Leaf, f64)> = None;
        for candidate in sbt.leaves() {
            let Ok(cand_mh) = candidate.data() else {
                continue;
            };
            let score = query_mh.similarity(cand_mh, true).unwrap_or(0.0);
            if score >= threshold {
                if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                    best = Some((candidate, score));
                }
            }
        }
        if let Some((best_leaf, score)) = best {
            out.push((query_leaf, best_leaf, score));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashFunctions;
    use crate::sketch::nodegraph::NodegraphFactory;

    fn mh(hashes: &[u64]) -> MinHash {
        let mut m = MinHash::new(0, 21, HashFunctions::Dna, 42, 10_000, false);
        m.add_many(hashes);
        m
    }

    #[test]
    fn gather_explains_query_with_one_exact_match() {
        let query = mh(&[1, 2, 3, 4]);
        let factory = NodegraphFactory::new(21, 4096, 3);
        let mut sbt = SBT::new(2, factory);
        sbt.add_leaf(Leaf::new("a", "a.sig", mh(&[1, 2, 3, 4]))).unwrap();

        let targets = GatherTargets::new().with_tree(&sbt);
        let records = gather(&query, &targets, 1).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "a");
        assert!((records[0].f_unique_to_query - 1.0).abs() < 1e-9);
    }

    #[test]
    fn gather_decomposes_across_two_leaves() {
        let query = mh(&[1, 2, 3, 4, 5, 6]);
        let factory = NodegraphFactory::new(21, 4096, 3);
        let mut sbt = SBT::new(2, factory);
        sbt.add_leaf(Leaf::new("big", "big.sig", mh(&[1, 2, 3, 4]))).unwrap();
        sbt.add_leaf(Leaf::new("small", "small.sig", mh(&[5, 6]))).unwrap();

        let targets = GatherTargets::new().with_tree(&sbt);
        let records = gather(&query, &targets, 1).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "big");
        assert_eq!(records[1].name, "small");
        let total: f64 = records.iter().map(|r| r.f_unique_to_query).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn gather_stops_below_threshold() {
        let query = mh(&[1, 2, 3]);
        let factory = NodegraphFactory::new(21, 4096, 3);
        let mut sbt = SBT::new(2, factory);
        sbt.add_leaf(Leaf::new("tiny", "tiny.sig", mh(&[1]))).unwrap();

        let targets = GatherTargets::new().with_tree(&sbt);
        let records = gather(&query, &targets, 1_000_000).unwrap();
        assert!(records.is_empty());
    }
}
