use crate::format::format_size;
use crate::model::ModelInfo;
use std::io::{self, Write};

const HEADERS: [&str; 6] = [
    "MODEL ID",
    "SIZE ON DISK",
    "NB FILES",
    "LAST ACCESSED",
    "LAST MODIFIED",
    "MODEL PATH",
];
const RIGHT_ALIGNED: [bool; 6] = [false, true, true, false, false, false];
const COLUMN_GAP: &str = "  ";

/// Prints the model table followed by the scan summary line.
pub fn print_model_table<W: Write>(out: &mut W, models: &[ModelInfo]) -> io::Result<()> {
    let rows: Vec<[String; 6]> = models
        .iter()
        .map(|model| {
            [
                model.id.clone(),
                model.size_on_disk_str(),
                model.num_files.to_string(),
                model.last_accessed_str(),
                model.last_modified_str(),
                model.path.display().to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|header| header.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    writeln!(out)?;
    write_row(out, &HEADERS.map(String::from), &widths)?;
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    writeln!(out, "{}", rule.join(COLUMN_GAP))?;
    for row in &rows {
        write_row(out, row, &widths)?;
    }
    writeln!(out)?;

    let total: u64 = models.iter().map(|model| model.size_on_disk).sum();
    writeln!(
        out,
        "Scanned {} repo(s) for a total of {}.",
        models.len(),
        format_size(total)
    )
}

fn write_row<W: Write>(out: &mut W, row: &[String; 6], widths: &[usize; 6]) -> io::Result<()> {
    let cells: Vec<String> = row
        .iter()
        .zip(widths)
        .zip(RIGHT_ALIGNED)
        .map(|((cell, width), right)| {
            if right {
                format!("{:>width$}", cell, width = width)
            } else {
                format!("{:<width$}", cell, width = width)
            }
        })
        .collect();
    writeln!(out, "{}", cells.join(COLUMN_GAP).trim_end())
}
