#![forbid(unsafe_code)]

use std::io::{self, Write};

const GAP: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

#[derive(Debug)]
struct Column {
    header: String,
    width: usize,
    numeric: bool,
}

impl Column {
    fn align(&self) -> Align {
        if self.numeric { Align::Right } else { Align::Left }
    }
}

/// Listing of tasks, logistics entries or transport proposals.
///
/// Text output right-aligns columns whose every cell is a number (amounts,
/// priorities, tick counts) and leaves the last column unpadded. Rows shorter
/// than the header are filled with empty cells; extra cells are dropped.
#[derive(Debug, Default)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let columns = headers
            .into_iter()
            .map(|h| {
                let header: String = h.into();
                Column {
                    width: header.chars().count(),
                    header,
                    numeric: true,
                }
            })
            .collect();
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row(&mut self, cells: impl IntoIterator<Item = impl Into<String>>) {
        let mut cells: Vec<String> = cells.into_iter().map(Into::into).collect();
        cells.resize(self.columns.len(), String::new());
        for (col, cell) in self.columns.iter_mut().zip(&cells) {
            col.width = col.width.max(cell.chars().count());
            col.numeric &= cell.is_empty() || is_number(cell);
        }
        self.rows.push(cells);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn print(&self) -> io::Result<()> {
        self.render(io::stdout().lock())
    }

    pub fn write_csv(&self) -> io::Result<()> {
        self.render_csv(io::stdout().lock())
    }

    fn render(&self, mut out: impl Write) -> io::Result<()> {
        let header = self.columns.iter().map(|c| c.header.as_str());
        self.render_line(&mut out, header)?;
        for row in &self.rows {
            self.render_line(&mut out, row.iter().map(String::as_str))?;
        }
        out.flush()
    }

    fn render_line<'a>(
        &self,
        out: &mut impl Write,
        cells: impl Iterator<Item = &'a str>,
    ) -> io::Result<()> {
        let last = self.columns.len().saturating_sub(1);
        let mut line = String::new();
        for (i, (col, cell)) in self.columns.iter().zip(cells).enumerate() {
            if i > 0 {
                line.push_str(GAP);
            }
            let pad = col.width.saturating_sub(cell.chars().count());
            match col.align() {
                Align::Right => {
                    line.extend(std::iter::repeat_n(' ', pad));
                    line.push_str(cell);
                }
                Align::Left if i == last => line.push_str(cell),
                Align::Left => {
                    line.push_str(cell);
                    line.extend(std::iter::repeat_n(' ', pad));
                }
            }
        }
        writeln!(out, "{line}")
    }

    fn render_csv(&self, out: impl Write) -> io::Result<()> {
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record(self.columns.iter().map(|c| &c.header))?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()
    }
}

fn is_number(cell: &str) -> bool {
    cell.parse::<f64>().is_ok_and(f64::is_finite)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(t: &Table) -> String {
        let mut buf = Vec::new();
        t.render(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn numbers_align_right_and_the_last_column_is_not_padded() {
        let mut t = Table::new(["SOURCE", "AMOUNT", "TARGET"]);
        t.row(["container1", "300", "spawn1"]);
        t.row(["pile", "50", "ext"]);

        let out = text(&t);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "SOURCE      AMOUNT  TARGET");
        assert_eq!(lines[1], "container1     300  spawn1");
        assert_eq!(lines[2], "pile            50  ext");
    }

    #[test]
    fn one_word_in_a_column_keeps_it_left_aligned() {
        let mut t = Table::new(["ID", "PRIORITY"]);
        t.row(["a", "2.5"]);
        t.row(["b", "n/a"]);
        t.row(["c", "10"]);

        let out = text(&t);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "a   2.5");
        assert_eq!(lines[3], "c   10");
    }

    #[test]
    fn short_rows_are_filled_and_long_rows_cut() {
        let mut t = Table::new(["WORKER", "STATE"]);
        t.row(["carrier1"]);
        t.row(["carrier2", "moving", "extra"]);

        assert!(!t.is_empty());
        let out = text(&t);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "carrier1  ");
        assert_eq!(lines[2], "carrier2  moving");
    }

    #[test]
    fn csv_quotes_cells_with_commas() {
        let mut t = Table::new(["room", "pos"]);
        t.row(["W1N1", "10,12"]);

        let mut buf = Vec::new();
        t.render_csv(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "room,pos\nW1N1,\"10,12\"\n");
    }
}
