//! Print the rows of a saved contacts workbook, tab separated.

use std::path::PathBuf;

use card_scanner_lib::excel::{export_headers, read_rows};

fn main() {
    let Some(path) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("usage: dump_excel <extracted_details.xlsx>");
        std::process::exit(2);
    };
    match read_rows(&path) {
        Ok(rows) => {
            println!("{}", export_headers().join("\t"));
            for row in rows {
                println!("{}", row.join("\t"));
            }
        }
        Err(e) => {
            eprintln!("{}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
