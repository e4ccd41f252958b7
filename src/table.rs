// vermon: Grid-formatted tables for operator-facing log output

/// Render a grid table (header row separated by `=`, body rows by `-`).
pub fn grid(headers: &[&str], rows: &[Vec<String>]) -> String {
    let columns = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(columns) {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let mut out = String::new();
    push_separator(&mut out, &widths, '-');
    push_row(&mut out, headers.iter().map(|h| h.to_string()), &widths);
    push_separator(&mut out, &widths, '=');
    for row in rows {
        push_row(&mut out, row.iter().cloned(), &widths);
        push_separator(&mut out, &widths, '-');
    }
    out
}

fn push_separator(out: &mut String, widths: &[usize], fill: char) {
    for width in widths {
        out.push('+');
        for _ in 0..(width + 2) {
            out.push(fill);
        }
    }
    out.push_str("+\n");
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    for (cell, width) in cells.zip(widths.iter()) {
        out.push_str("| ");
        out.push_str(&cell);
        for _ in cell.len()..(*width + 1) {
            out.push(' ');
        }
    }
    out.push_str("|\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_aligned_grid() {
        let table = grid(
            &["Name", "Count"],
            &[
                vec!["cart".to_string(), "3".to_string()],
                vec!["checkout".to_string(), "11".to_string()],
            ],
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "+----------+-------+");
        assert_eq!(lines[1], "| Name     | Count |");
        assert_eq!(lines[2], "+==========+=======+");
        assert!(lines[3].starts_with("| cart"));
        // Every line has the same width.
        assert!(lines.iter().all(|l| l.len() == lines[0].len()));
    }

    #[test]
    fn empty_rows_still_render_header() {
        let table = grid(&["A"], &[]);
        assert!(table.contains("| A |"));
    }
}
