//! Text format of PAML amino acid rate matrix files.
//!
//! A file starts with the strictly lower triangle of the exchangeability matrix, row `i` holding
//! `i` whitespace separated values (the empty first row is usually left out), followed by a blank
//! line and one line with the 20 stationary frequencies. Anything after the frequency line is
//! ignored, which is where PAML files keep their comments.

use anyhow::bail;
use itertools::Itertools;

use crate::alphabets::N;
use crate::substitution_models::{FreqVector, ModelError, SubstMatrix};
use crate::Result;

/// Reads the exchangeabilities and stationary frequencies from a PAML formatted string.
///
/// The returned matrix is symmetric with a zero diagonal. No model checks are run here,
/// see [`crate::substitution_models::SubstitutionModel::new`].
pub fn parse(text: &str) -> Result<(SubstMatrix, FreqVector)> {
    let mut lines = text.lines().enumerate();
    let mut rows: Vec<Vec<f64>> = vec![Vec::new()];
    let mut separated = false;

    for (line_no, line) in lines.by_ref() {
        let line = line.trim();
        if line.is_empty() {
            if rows.len() < N {
                continue;
            }
            separated = true;
            break;
        }
        if rows.len() == N {
            bail!(ModelError::MissingSeparator);
        }
        let row = parse_numbers(line, line_no + 1)?;
        if row.len() != rows.len() {
            bail!(ModelError::RowLength {
                row: rows.len(),
                expected: rows.len(),
                found: row.len(),
            });
        }
        rows.push(row);
    }
    if rows.len() < N {
        bail!(ModelError::RowLength {
            row: rows.len(),
            expected: rows.len(),
            found: 0,
        });
    }
    if !separated {
        bail!(ModelError::MissingFrequencies);
    }

    let Some((line_no, line)) = lines.find(|(_, line)| !line.trim().is_empty()) else {
        bail!(ModelError::MissingFrequencies);
    };
    let freqs = parse_numbers(line.trim(), line_no + 1)?;
    if freqs.len() != N {
        bail!(ModelError::FrequencyCount { found: freqs.len() });
    }

    let mut exchangeability = SubstMatrix::zeros(N, N);
    for (i, row) in rows.iter().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            exchangeability[(i, j)] = value;
            exchangeability[(j, i)] = value;
        }
    }
    Ok((exchangeability, FreqVector::from_vec(freqs)))
}

fn parse_numbers(line: &str, line_no: usize) -> Result<Vec<f64>> {
    let mut values = Vec::new();
    for token in line.split_whitespace() {
        match token.parse::<f64>() {
            Ok(value) => values.push(value),
            Err(_) => bail!(ModelError::BadNumber {
                line: line_no,
                token: token.to_string(),
            }),
        }
    }
    Ok(values)
}

/// Formats exchangeabilities and frequencies in the PAML layout read by [`parse`].
///
/// Values are written with the shortest representation that reads back to the same `f64`.
pub fn format(exchangeability: &SubstMatrix, freqs: &FreqVector) -> String {
    let mut text = String::new();
    for i in 1..exchangeability.nrows() {
        text.push_str(&(0..i).map(|j| exchangeability[(i, j)]).join(" "));
        text.push('\n');
    }
    text.push('\n');
    text.push_str(&freqs.iter().join(" "));
    text.push('\n');
    text
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests {
    use assert_matches::assert_matches;

    use crate::alphabets::N;
    use crate::substitution_models::paml::{format, parse};
    use crate::substitution_models::{FreqVector, ModelError, SubstMatrix};

    fn triangle(value: f64) -> String {
        (1..N)
            .map(|i| vec![value.to_string(); i].join(" "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn freq_line() -> String {
        vec!["0.05"; N].join(" ")
    }

    #[test]
    fn parse_symmetric_fill() {
        let mut text = String::new();
        for i in 1..N {
            let row = (0..i).map(|j| format!("{}", i * 100 + j)).collect::<Vec<_>>();
            text.push_str(&row.join(" "));
            text.push('\n');
        }
        text.push_str(&format!("\n{}\n", freq_line()));
        let (s, freqs) = parse(&text).unwrap();
        assert_eq!(s[(3, 1)], 301.0);
        assert_eq!(s[(1, 3)], 301.0);
        assert_eq!(s[(19, 18)], 1918.0);
        assert_eq!(s[(0, 19)], 1900.0);
        assert_eq!(s[(7, 7)], 0.0);
        assert_eq!(freqs, FreqVector::from_element(N, 0.05));
    }

    #[test]
    fn parse_skips_leading_blank_lines_and_trailing_comments() {
        let text = format!(
            "\n\n{}\n\n\n{}\n\nA R N D C Q E G H I L K M F P S T W Y V\nsome comment\n",
            triangle(1.5),
            freq_line()
        );
        let (s, freqs) = parse(&text).unwrap();
        assert_eq!(s[(10, 2)], 1.5);
        assert_eq!(freqs.len(), N);
    }

    #[test]
    fn parse_bad_number() {
        let text = format!("1.0\n2.0 x3\n{}", triangle(1.0));
        let err = parse(&text).unwrap_err();
        assert_matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::BadNumber { line: 2, token }) if token == "x3"
        );
    }

    #[test]
    fn parse_truncated_triangle() {
        let text = "1.0\n2.0 2.0\n";
        let err = parse(text).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ModelError>(),
            Some(&ModelError::RowLength {
                row: 3,
                expected: 3,
                found: 0
            })
        );
    }

    #[test]
    fn parse_bad_frequency_count() {
        let text = format!("{}\n\n0.5 0.5\n", triangle(1.0));
        let err = parse(&text).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ModelError>(),
            Some(&ModelError::FrequencyCount { found: 2 })
        );
    }

    #[test]
    fn format_layout() {
        let s = SubstMatrix::from_fn(N, N, |i, j| if i == j { -1.0 } else { 0.25 });
        let text = format(&s, &FreqVector::from_element(N, 0.05));
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), N + 1);
        assert_eq!(lines[0], "0.25");
        assert_eq!(lines[2], "0.25 0.25 0.25");
        assert_eq!(lines[N - 2].split(' ').count(), N - 1);
        assert_eq!(lines[N - 1], "");
        assert_eq!(lines[N], freq_line());
    }
}
