use seqsketch::hash::HashFunctions;
use seqsketch::sketch::MinHash;

#[test]
fn bottom_k_basic_single_repeated_kmer() {
    let mut m = MinHash::new(5, 5, HashFunctions::Dna, 42, 0, false);
    m.add_sequence(b"AAAAAAAAA").unwrap();
    assert_eq!(m.size(), 1);
    assert_eq!(m.similarity(&m, true).unwrap(), 1.0);
}

#[test]
fn canonical_dna_hash_matches_reverse_complement() {
    let mut fwd = MinHash::new(0, 5, HashFunctions::Dna, 42, u64::MAX, false);
    fwd.add_sequence(b"ATGGA").unwrap();

    let mut rc = MinHash::new(0, 5, HashFunctions::Dna, 42, u64::MAX, false);
    rc.add_sequence(b"TCCAT").unwrap();

    assert_eq!(fwd.mins(), rc.mins());
}

#[test]
fn scaled_containment_of_strict_subset() {
    let max_hash = seqsketch::sketch::minhash::max_hash_for_scaled(1000).unwrap();

    let mut a = MinHash::new(0, 21, HashFunctions::Dna, 42, max_hash, false);
    a.add_many(&[10, 20, 30]);

    let mut b = MinHash::new(0, 21, HashFunctions::Dna, 42, max_hash, false);
    b.add_many(&[10, 20, 30, 40, 50, 60, 70, 80]);

    assert_eq!(a.contained_by(&b).unwrap(), 1.0);
    assert!((b.contained_by(&a).unwrap() - (a.size() as f64 / b.size() as f64)).abs() < 1e-9);
}
