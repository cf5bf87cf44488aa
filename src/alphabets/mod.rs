use lazy_static::lazy_static;

/// Amino acids in the order used by PAML rate matrix files.
pub static AMINOACIDS: &[u8] = b"ARNDCQEGHILKMFPSTWYV";
pub static GAP: u8 = b'-';

/// Number of character states of the substitution process.
pub const N: usize = 20;

/// Marks bytes that do not map to an amino acid state.
const NO_STATE: usize = usize::MAX;

lazy_static! {
    pub static ref AMINOACID_INDEX: [usize; 255] = {
        let mut index = [NO_STATE; 255];
        for (i, &char) in AMINOACIDS.iter().enumerate() {
            index[char as usize] = i;
            index[char.to_ascii_lowercase() as usize] = i;
        }
        index
    };
}

/// Returns the state index of a residue, or None for gaps and any byte outside of
/// the 20 letter amino acid alphabet.
///
/// # Example
/// ```
/// use phylo_rates::alphabets::residue_index;
/// assert_eq!(residue_index(b'A'), Some(0));
/// assert_eq!(residue_index(b'v'), Some(19));
/// assert_eq!(residue_index(b'-'), None);
/// assert_eq!(residue_index(b'X'), None);
/// ```
pub fn residue_index(char: u8) -> Option<usize> {
    match AMINOACID_INDEX.get(char as usize) {
        Some(&idx) if idx != NO_STATE => Some(idx),
        _ => None,
    }
}

pub fn is_informative(char: u8) -> bool {
    residue_index(char).is_some()
}

/// Normalises a raw sequence read from file: upper case, B is read as D, Z as Q, and
/// everything that is not an amino acid (X, stop codons, alternative gap symbols) becomes
/// a gap.
///
/// # Example
/// ```
/// use phylo_rates::alphabets::clean_residues;
/// assert_eq!(clean_residues(b"arnBZx.*~W"), b"ARNDQ----W".to_vec());
/// ```
pub fn clean_residues(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .map(|c| match c.to_ascii_uppercase() {
            b'B' => b'D',
            b'Z' => b'Q',
            upper if AMINOACIDS.contains(&upper) => upper,
            _ => GAP,
        })
        .collect()
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests;
