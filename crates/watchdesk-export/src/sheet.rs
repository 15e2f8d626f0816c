//! [`Sheet`] — an ordered set of flat rows with a stable column header.

/// One exportable sheet. Column order is part of the contract: report
/// consumers key on position as well as header text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
  pub name:    String,
  pub columns: Vec<&'static str>,
  pub rows:    Vec<Vec<String>>,
}

impl Sheet {
  pub fn new(name: &str, columns: Vec<&'static str>) -> Self {
    Self { name: name.to_string(), columns, rows: Vec::new() }
  }

  pub fn push_row(&mut self, row: Vec<String>) {
    self.rows.push(row);
  }

  /// Render as CSV with a header line. Fields containing commas, quotes,
  /// or newlines are quoted, with embedded quotes doubled.
  pub fn to_csv(&self) -> String {
    let mut out = String::new();
    push_csv_line(
      &mut out,
      self.columns.iter().map(|c| (*c).to_string()).collect(),
    );
    for row in &self.rows {
      push_csv_line(&mut out, row.clone());
    }
    out
  }
}

fn push_csv_line(out: &mut String, fields: Vec<String>) {
  let line: Vec<String> = fields.into_iter().map(csv_field).collect();
  out.push_str(&line.join(","));
  out.push('\n');
}

fn csv_field(field: String) -> String {
  if field.contains(',') || field.contains('"') || field.contains('\n') {
    format!("\"{}\"", field.replace('"', "\"\""))
  } else {
    field
  }
}
