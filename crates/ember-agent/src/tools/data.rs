//! Data tools for the direct-call surface
//!
//! `ping`, `parse_csv`, `analyze_data` and `generate_infographic` are served
//! through `/tools/call` only. They are never advertised to the model, so the
//! conversation loop keeps exactly the five built-in tools.

use super::executor::{parse_arguments, ToolError, ToolExecutor};
use super::registry::ToolHandler;
use super::ToolDeclaration;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Number of most frequent values shown per column in an infographic
const TOP_VALUES: usize = 5;

/// Placeholder for blank cells in an infographic
const NO_DATA: &str = "No data";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PingArgs {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParseCsvArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnalyzeDataArgs {
    path: String,
    column: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GenerateInfographicArgs {
    #[serde(alias = "csvPath")]
    csv_path: String,
    #[serde(alias = "outputPath")]
    output_path: String,
    title: String,
}

/// A parsed CSV file: the header row and one object per data row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Map<String, JsonValue>>,
}

impl CsvTable {
    /// Parse CSV text. Cells are trimmed, short rows are padded with empty
    /// strings and blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.trim().as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(str::is_empty) {
                continue;
            }

            let row = headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let cell = record.get(i).unwrap_or_default();
                    (header.clone(), JsonValue::String(cell.to_string()))
                })
                .collect();
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    /// Cell text of a column, `""` where a row lacks it
    fn column<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(column).and_then(JsonValue::as_str).unwrap_or_default())
    }
}

/// Summary statistics of one CSV column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub column: String,
    /// Number of data rows
    pub count: usize,
    /// Number of cells that parse as finite numbers
    pub numeric_count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: f64,
    pub average: Option<f64>,
    pub median: Option<f64>,
}

impl ColumnStats {
    pub fn compute(table: &CsvTable, column: &str) -> Result<Self, ToolError> {
        if !table.headers.iter().any(|h| h == column) {
            return Err(ToolError::UnknownColumn(column.to_string()));
        }

        let mut values: Vec<f64> = table
            .column(column)
            .filter_map(|cell| cell.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect();
        values.sort_by(f64::total_cmp);

        let sum: f64 = values.iter().sum();
        let average = (!values.is_empty()).then(|| sum / values.len() as f64);
        let median = match values.len() {
            0 => None,
            n if n % 2 == 0 => Some((values[n / 2 - 1] + values[n / 2]) / 2.0),
            n => Some(values[n / 2]),
        };

        Ok(Self {
            column: column.to_string(),
            count: table.rows.len(),
            numeric_count: values.len(),
            min: values.first().copied(),
            max: values.last().copied(),
            sum,
            average,
            median,
        })
    }
}

/// Value frequencies of one column, most frequent first
struct ColumnSummary {
    header: String,
    top: Vec<(String, usize)>,
    unique_values: usize,
}

impl ColumnSummary {
    fn new(table: &CsvTable, header: &str) -> Self {
        // first-seen order breaks ties
        let mut counts: Vec<(String, usize)> = Vec::new();
        for cell in table.column(header) {
            let value = if cell.is_empty() { NO_DATA } else { cell };
            match counts.iter_mut().find(|(v, _)| v == value) {
                Some((_, count)) => *count += 1,
                None => counts.push((value.to_string(), 1)),
            }
        }

        let unique_values = counts.len();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts.truncate(TOP_VALUES);

        Self {
            header: header.to_string(),
            top: counts,
            unique_values,
        }
    }

    fn render(&self, total: usize) -> String {
        let header = escape_html(&self.header);
        let Some(&(_, max_count)) = self.top.first() else {
            return format!(
                "<div class=\"card\"><h2>{}</h2><p class=\"no-data\">{}</p></div>",
                header, NO_DATA
            );
        };

        let bars: String = self
            .top
            .iter()
            .map(|(value, count)| {
                let width = (*count as f64 / max_count as f64 * 100.0).round();
                format!(
                    "<div class=\"bar\"><span>{}</span><div style=\"--width: {}%\"></div><p>{}</p></div>",
                    count,
                    width,
                    escape_html(value)
                )
            })
            .collect();

        format!(
            "<div class=\"card\"><h2>{}</h2>{}<p class=\"no-data\">Responses: {}, unique values: {}</p></div>",
            header, bars, total, self.unique_values
        )
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render a self-contained HTML page summarizing every column of a table
pub fn render_infographic(title: &str, table: &CsvTable) -> String {
    let total = table.rows.len();
    let cards: String = table
        .headers
        .iter()
        .map(|header| ColumnSummary::new(table, header).render(total))
        .collect();
    let title = escape_html(title);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>{title}</title>
    <style>
      body {{ font-family: sans-serif; background: #f4f6f8; color: #2c3e50; margin: 0; padding: 40px; }}
      h1, .summary {{ text-align: center; }}
      .grid {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(250px, 1fr)); gap: 20px; }}
      .card {{ background: white; border-radius: 12px; padding: 20px; }}
      .bar {{ display: flex; align-items: center; margin: 8px 0; }}
      .bar span {{ flex: 0 0 50px; font-weight: bold; }}
      .bar div {{ flex: 1; height: 10px; background: #ecf0f1; position: relative; }}
      .bar div::after {{ content: ""; position: absolute; left: 0; top: 0; bottom: 0; background: #3498db; width: var(--width, 0%); }}
      .bar p {{ margin-left: 10px; }}
      .no-data {{ font-style: italic; color: #7f8c8d; }}
    </style>
  </head>
  <body>
    <h1>{title}</h1>
    <div class="summary">Total responses: {total}</div>
    <div class="grid">{cards}</div>
  </body>
</html>
"#
    )
}

impl ToolExecutor {
    async fn load_csv(&self, path: &str) -> Result<CsvTable, ToolError> {
        let text = self.sandbox().read_file(path).await?;
        Ok(CsvTable::parse(&text)?)
    }

    /// Execute the ping tool
    pub async fn ping(&self, arguments: JsonValue) -> Result<String, ToolError> {
        let args: PingArgs = parse_arguments(arguments)?;
        let reply = serde_json::json!({
            "echo": args.message,
            "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        Ok(reply.to_string())
    }

    /// Execute the parse_csv tool
    pub async fn parse_csv(&self, arguments: JsonValue) -> Result<String, ToolError> {
        let args: ParseCsvArgs = parse_arguments(arguments)?;
        let table = self.load_csv(&args.path).await?;
        Ok(serde_json::to_string(&table)?)
    }

    /// Execute the analyze_data tool
    pub async fn analyze_data(&self, arguments: JsonValue) -> Result<String, ToolError> {
        let args: AnalyzeDataArgs = parse_arguments(arguments)?;
        let table = self.load_csv(&args.path).await?;
        let stats = ColumnStats::compute(&table, &args.column)?;
        Ok(serde_json::to_string(&stats)?)
    }

    /// Execute the generate_infographic tool
    pub async fn generate_infographic(&self, arguments: JsonValue) -> Result<String, ToolError> {
        let args: GenerateInfographicArgs = parse_arguments(arguments)?;
        // reject an escaping output path before doing any work
        self.sandbox().resolve(&args.output_path)?;

        let table = self.load_csv(&args.csv_path).await?;
        let html = render_infographic(&args.title, &table);
        self.sandbox().write_file(&args.output_path, &html).await?;

        tracing::debug!("Infographic for {} written to {}", args.csv_path, args.output_path);
        let reply = serde_json::json!({
            "success": true,
            "output_path": args.output_path,
            "total_responses": table.rows.len(),
        });
        Ok(reply.to_string())
    }
}

/// Tools offered on the direct-call surface in addition to the built-ins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTool {
    Ping,
    ParseCsv,
    AnalyzeData,
    GenerateInfographic,
}

impl DataTool {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ping" => Some(DataTool::Ping),
            "parse_csv" => Some(DataTool::ParseCsv),
            "analyze_data" => Some(DataTool::AnalyzeData),
            "generate_infographic" => Some(DataTool::GenerateInfographic),
            _ => None,
        }
    }
}

#[async_trait]
impl ToolHandler for DataTool {
    async fn call(&self, executor: &ToolExecutor, arguments: JsonValue) -> Result<String, ToolError> {
        match self {
            DataTool::Ping => executor.ping(arguments).await,
            DataTool::ParseCsv => executor.parse_csv(arguments).await,
            DataTool::AnalyzeData => executor.analyze_data(arguments).await,
            DataTool::GenerateInfographic => executor.generate_infographic(arguments).await,
        }
    }
}

pub fn ping_tool() -> ToolDeclaration {
    ToolDeclaration {
        name: "ping".to_string(),
        description: "Echo a message back with a timestamp.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Text the server sends back"}
            },
            "required": ["message"]
        }),
    }
}

pub fn parse_csv_tool() -> ToolDeclaration {
    ToolDeclaration {
        name: "parse_csv".to_string(),
        description: "Parse a CSV file into its headers and one object per row.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the CSV file, relative to the project root"}
            },
            "required": ["path"]
        }),
    }
}

pub fn analyze_data_tool() -> ToolDeclaration {
    ToolDeclaration {
        name: "analyze_data".to_string(),
        description: "Compute count, min, max, sum, average and median of a numeric CSV column.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the CSV file, relative to the project root"},
                "column": {"type": "string", "description": "Header of the column to analyze"}
            },
            "required": ["path", "column"]
        }),
    }
}

pub fn generate_infographic_tool() -> ToolDeclaration {
    ToolDeclaration {
        name: "generate_infographic".to_string(),
        description: "Render an HTML page summarizing the value frequencies of every CSV column.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "csv_path": {"type": "string", "description": "Path of the CSV file with the data"},
                "output_path": {"type": "string", "description": "Where to write the HTML page"},
                "title": {"type": "string", "description": "Page title"}
            },
            "required": ["csv_path", "output_path", "title"]
        }),
    }
}

/// Declarations of the direct-call data tools
pub fn data_tools() -> Vec<ToolDeclaration> {
    vec![
        ping_tool(),
        parse_csv_tool(),
        analyze_data_tool(),
        generate_infographic_tool(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::Sandbox;
    use serde_json::json;
    use tempfile::TempDir;

    fn executor() -> (TempDir, ToolExecutor) {
        let temp_dir = TempDir::new().unwrap();
        let executor = ToolExecutor::new(Sandbox::new(temp_dir.path()).unwrap());
        (temp_dir, executor)
    }

    const SURVEY: &str = "name, score ,team\nada, 9, red\nbob,3,blue\n\ncyd,n/a\ndee,6,red\n";

    #[test]
    fn test_parse_csv_text() {
        let table = CsvTable::parse(SURVEY).unwrap();
        assert_eq!(table.headers, vec!["name", "score", "team"]);
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[0]["score"], "9");
        assert_eq!(table.rows[2]["team"], "");
    }

    #[test]
    fn test_parse_empty_csv() {
        let table = CsvTable::parse("  \n").unwrap();
        assert!(table.headers.is_empty());
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_column_stats() {
        let table = CsvTable::parse(SURVEY).unwrap();
        let stats = ColumnStats::compute(&table, "score").unwrap();

        assert_eq!(stats.count, 4);
        assert_eq!(stats.numeric_count, 3);
        assert_eq!(stats.min, Some(3.0));
        assert_eq!(stats.max, Some(9.0));
        assert_eq!(stats.sum, 18.0);
        assert_eq!(stats.average, Some(6.0));
        assert_eq!(stats.median, Some(6.0));
    }

    #[test]
    fn test_column_stats_even_and_empty() {
        let table = CsvTable::parse("v\n1\n4\n").unwrap();
        assert_eq!(ColumnStats::compute(&table, "v").unwrap().median, Some(2.5));

        let table = CsvTable::parse("v\nx\n").unwrap();
        let stats = ColumnStats::compute(&table, "v").unwrap();
        assert_eq!(stats.numeric_count, 0);
        assert_eq!(stats.average, None);
        assert_eq!(stats.sum, 0.0);
    }

    #[test]
    fn test_unknown_column() {
        let table = CsvTable::parse(SURVEY).unwrap();
        let err = ColumnStats::compute(&table, "age").unwrap_err();
        assert_eq!(err.to_string(), "column 'age' not found in CSV");
    }

    #[test]
    fn test_infographic_escapes_and_ranks() {
        let table = CsvTable::parse(SURVEY).unwrap();
        let html = render_infographic("<Survey>", &table);

        assert!(html.contains("<title>&lt;Survey&gt;</title>"));
        assert!(html.contains("Total responses: 4"));
        // "red" appears twice and comes first in the team card
        let red = html.find("<p>red</p>").unwrap();
        let blue = html.find("<p>blue</p>").unwrap();
        assert!(red < blue);
        assert!(html.contains(&format!("<p>{}</p>", NO_DATA)));
    }

    #[tokio::test]
    async fn test_ping() {
        let (_dir, executor) = executor();
        let output = executor.ping(json!({"message": "hello"})).await.unwrap();
        let value: JsonValue = serde_json::from_str(&output).unwrap();

        assert_eq!(value["echo"], "hello");
        let ts = value["ts"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[tokio::test]
    async fn test_parse_csv_and_analyze_tools() {
        let (dir, executor) = executor();
        std::fs::write(dir.path().join("survey.csv"), SURVEY).unwrap();

        let output = executor.parse_csv(json!({"path": "survey.csv"})).await.unwrap();
        let value: JsonValue = serde_json::from_str(&output).unwrap();
        assert_eq!(value["headers"], json!(["name", "score", "team"]));
        assert_eq!(value["rows"][1], json!({"name": "bob", "score": "3", "team": "blue"}));

        let output = executor
            .analyze_data(json!({"path": "survey.csv", "column": "score"}))
            .await
            .unwrap();
        let value: JsonValue = serde_json::from_str(&output).unwrap();
        assert_eq!(value["numeric_count"], 3);
        assert_eq!(value["median"], 6.0);
    }

    #[tokio::test]
    async fn test_csv_tools_stay_in_sandbox() {
        let (_dir, executor) = executor();
        let err = executor.parse_csv(json!({"path": "../data.csv"})).await.unwrap_err();
        assert_eq!(err.to_string(), "access outside project directory is forbidden");
    }

    #[tokio::test]
    async fn test_generate_infographic() {
        let (dir, executor) = executor();
        std::fs::write(dir.path().join("survey.csv"), SURVEY).unwrap();

        let output = executor
            .generate_infographic(json!({
                "csvPath": "survey.csv",
                "outputPath": "out/report.html",
                "title": "Survey"
            }))
            .await
            .unwrap();
        let value: JsonValue = serde_json::from_str(&output).unwrap();
        assert_eq!(value["total_responses"], 4);

        let html = std::fs::read_to_string(dir.path().join("out/report.html")).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));

        let err = executor
            .generate_infographic(json!({"csv_path": "survey.csv", "output_path": "../x.html", "title": "t"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Sandbox(_)));
    }

    #[test]
    fn test_data_tools_resolve() {
        for declaration in data_tools() {
            assert!(DataTool::from_name(&declaration.name).is_some());
        }
    }
}
