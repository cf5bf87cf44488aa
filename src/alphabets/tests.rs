use rstest::rstest;

use crate::alphabets::{
    clean_residues, is_informative, residue_index, AMINOACIDS, AMINOACID_INDEX, GAP, N,
};

#[test]
fn aminoacid_index_covers_alphabet() {
    assert_eq!(AMINOACIDS.len(), N);
    for (i, &char) in AMINOACIDS.iter().enumerate() {
        assert_eq!(AMINOACID_INDEX[char as usize], i);
        assert_eq!(residue_index(char), Some(i));
        assert_eq!(residue_index(char.to_ascii_lowercase()), Some(i));
    }
}

#[rstest]
#[case::gap(GAP)]
#[case::unknown(b'X')]
#[case::ambiguous(b'B')]
#[case::stop(b'*')]
#[case::digit(b'1')]
#[case::high_byte(254)]
fn non_residues_have_no_state(#[case] char: u8) {
    assert_eq!(residue_index(char), None);
    assert!(!is_informative(char));
}

#[test]
fn clean_residues_maps_ambiguity_codes() {
    assert_eq!(clean_residues(b"B"), b"D");
    assert_eq!(clean_residues(b"z"), b"Q");
    assert_eq!(clean_residues(b"X"), b"-");
    assert_eq!(clean_residues(b"U"), b"-");
}

#[test]
fn clean_residues_keeps_alphabet() {
    let lower = AMINOACIDS.to_ascii_lowercase();
    assert_eq!(clean_residues(&lower), AMINOACIDS.to_vec());
    assert_eq!(clean_residues(b"A-C"), b"A-C".to_vec());
    assert!(clean_residues(b"").is_empty());
}
