use seqsketch::hash::HashFunctions;
use seqsketch::signature::Signature;
use seqsketch::sketch::MinHash;

fn sample_signature(name: &str, seq: &[u8]) -> Signature {
    let mut mh = MinHash::new(0, 21, HashFunctions::Dna, 42, 1_000_000, false);
    mh.add_sequence(seq).unwrap();

    Signature::builder()
        .name(Some(name.to_string()))
        .sketches(vec![mh])
        .build()
}

fn wrap_as_array(sigs: &[Signature]) -> String {
    let records: Vec<String> = sigs.iter().map(|s| serde_json::to_string(s).unwrap()).collect();
    format!("[{}]", records.join(","))
}

#[test]
fn signature_round_trips_through_json() {
    let sig = sample_signature("test genome", b"ACGTACGTACGTACGTACGTACGTACGT");
    let json = wrap_as_array(std::slice::from_ref(&sig));

    let loaded = Signature::from_reader(json.as_bytes()).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name(), "test genome");
    assert_eq!(loaded[0].sketches()[0].mins(), sig.sketches()[0].mins());
}

#[test]
fn streaming_load_yields_each_record_independently() {
    let a = sample_signature("test genome", b"ACGTACGTACGTACGTACGTACGTACGT");
    let b = sample_signature("other genome", b"TTTTAAAACCCCGGGGTTTTAAAACCCC");

    let combined = wrap_as_array(&[a, b]);

    let loaded = Signature::from_reader(combined.as_bytes()).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].name(), "test genome");
    assert_eq!(loaded[1].name(), "other genome");
}
