use std::sync::Arc;

use seqsketch::hash::HashFunctions;
use seqsketch::index::sbt::{Leaf, SBT, TraversalOrder};
use seqsketch::index::storage::{FSStorage, TarStorage};
use seqsketch::sketch::nodegraph::NodegraphFactory;
use seqsketch::sketch::MinHash;

fn leaf(name: &str, hashes: &[u64]) -> Leaf {
    let mut mh = MinHash::new(0, 21, HashFunctions::Dna, 42, 1_000_000, false);
    mh.add_many(hashes);
    Leaf::new(name, format!("{name}.sig"), mh)
}

fn build_tree(d: u64, factory: NodegraphFactory, storage: Arc<dyn seqsketch::index::storage::Storage>) -> SBT {
    let mut sbt = SBT::with_storage(d, factory, storage);
    sbt.add_leaf(leaf("genomeA", &[1, 2, 3, 4])).unwrap();
    sbt.add_leaf(leaf("genomeB", &[5, 6, 7, 8])).unwrap();
    sbt.add_leaf(leaf("genomeC", &[1, 2, 9, 10])).unwrap();
    sbt
}

#[test]
fn round_trips_through_fs_storage() {
    let dir = tempfile::tempdir().unwrap();
    let factory = NodegraphFactory::new(21, 4096, 3);

    let storage = Arc::new(FSStorage::new(dir.path().to_str().unwrap(), ""));
    let sbt = build_tree(2, factory, storage);

    let tag = dir.path().join("tree").to_str().unwrap().to_string();
    sbt.save(&tag).unwrap();

    let loaded = SBT::load(format!("{tag}.sbt.json"), factory, 2).unwrap();
    let mut names: Vec<String> = loaded.leaves().map(|l| l.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["genomeA", "genomeB", "genomeC"]);

    for l in loaded.leaves() {
        assert!(l.data().is_ok());
    }
}

#[test]
fn round_trips_through_tar_storage() {
    let dir = tempfile::tempdir().unwrap();
    let factory = NodegraphFactory::new(21, 4096, 3);

    let tar_path = dir.path().join("blobs.tar");
    let storage = Arc::new(TarStorage::new(&tar_path).unwrap());
    let sbt = build_tree(2, factory, storage);

    let tag = dir.path().join("tree").to_str().unwrap().to_string();
    sbt.save(&tag).unwrap();

    let loaded = SBT::load(format!("{tag}.sbt.json"), factory, 2).unwrap();
    let mut names: Vec<String> = loaded.leaves().map(|l| l.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["genomeA", "genomeB", "genomeC"]);
}

#[test]
fn find_matches_ground_truth_linear_scan() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(7);
    let factory = NodegraphFactory::new(21, 4096, 3);
    let mut sbt = SBT::new(2, factory);

    let names = ["a", "b", "c", "d", "e"];
    let mut leaf_hashes: Vec<(&str, Vec<u64>)> = Vec::new();
    for &name in &names {
        let hashes: Vec<u64> = (0..3).map(|_| rng.gen::<u64>() % 100_000).collect();
        sbt.add_leaf(leaf(name, &hashes)).unwrap();
        leaf_hashes.push((name, hashes));
    }

    for (_, hashes) in &leaf_hashes {
        for &kmer_hash in hashes {
            let mut query = MinHash::new(0, 21, HashFunctions::Dna, 42, 1_000_000, false);
            query.add_many(&[kmer_hash]);

            let found: std::collections::BTreeSet<String> = sbt
                .find(&query, 1.0, true, TraversalOrder::Bfs)
                .into_iter()
                .map(|l| l.name.clone())
                .collect();

            let expected: std::collections::BTreeSet<String> = leaf_hashes
                .iter()
                .filter(|(_, hs)| hs.contains(&kmer_hash))
                .map(|(n, _)| n.to_string())
                .collect();

            assert_eq!(found, expected);
        }
    }
}

#[test]
fn find_prunes_to_matching_leaves_only() {
    let factory = NodegraphFactory::new(21, 4096, 3);
    let mut sbt = SBT::new(2, factory);
    sbt.add_leaf(leaf("genomeA", &[1, 2, 3, 4])).unwrap();
    sbt.add_leaf(leaf("genomeB", &[5, 6, 7, 8])).unwrap();
    sbt.add_leaf(leaf("genomeC", &[1, 2, 9, 10])).unwrap();

    let mut query = MinHash::new(0, 21, HashFunctions::Dna, 42, 1_000_000, false);
    query.add_many(&[1, 2, 3, 4]);

    let hits = sbt.find(&query, 0.99, false, TraversalOrder::Dfs);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "genomeA");
}
