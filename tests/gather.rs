use seqsketch::gather::{gather, GatherTargets};
use seqsketch::hash::HashFunctions;
use seqsketch::index::sbt::{Leaf, SBT};
use seqsketch::sketch::nodegraph::NodegraphFactory;
use seqsketch::sketch::MinHash;

fn mh(hashes: &[u64]) -> MinHash {
    let mut m = MinHash::new(0, 21, HashFunctions::Dna, 42, 1_000_000, false);
    m.add_many(hashes);
    m
}

#[test]
fn gather_cover_explains_disjoint_union_exactly() {
    // Query = union of X, Y (disjoint hash sets). SBT holds X, Y, Z.
    let x = vec![1, 2, 3, 4];
    let y = vec![10, 20, 30];
    let z = vec![100, 200];

    let mut query_hashes = x.clone();
    query_hashes.extend(y.clone());
    let query = mh(&query_hashes);

    let factory = NodegraphFactory::new(21, 4096, 3);
    let mut sbt = SBT::new(2, factory);
    sbt.add_leaf(Leaf::new("X", "x.sig", mh(&x))).unwrap();
    sbt.add_leaf(Leaf::new("Y", "y.sig", mh(&y))).unwrap();
    sbt.add_leaf(Leaf::new("Z", "z.sig", mh(&z))).unwrap();

    let targets = GatherTargets::new().with_tree(&sbt);
    let records = gather(&query, &targets, 1).unwrap();

    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["X", "Y"]);

    let total: f64 = records.iter().map(|r| r.f_unique_to_query).sum();
    assert!((total - 1.0).abs() < 1e-9);

    assert_eq!(records[0].intersect_bp, x.len() as u64 * query.scaled());
    assert_eq!(records[1].intersect_bp, y.len() as u64 * query.scaled());
}
