use arrow_format_reader::batch::RecordBatch;
use arrow_format_reader::config::ReadOptions;
use arrow_format_reader::{FileReader, PartialRead};
use serde_json::{Value as Json, json};

const DEFAULT_MAX_ROWS: usize = 20;

fn parse_arg(args: &[String], name: &str) -> Option<String> {
    for (i, a) in args.iter().enumerate() {
        if let Some(v) = a.strip_prefix(&(name.to_string() + "=")) {
            return Some(v.to_string());
        }
        if a == name {
            return args.get(i + 1).cloned();
        }
    }
    None
}

fn parse_max_rows(args: &[String]) -> Result<usize, String> {
    match parse_arg(args, "--max-rows") {
        Some(raw) => raw
            .parse()
            .map_err(|e| format!("invalid --max-rows {raw:?}: {e}")),
        None => Ok(DEFAULT_MAX_ROWS),
    }
}

fn parse_options(args: &[String]) -> Result<ReadOptions, String> {
    match parse_arg(args, "--options") {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| format!("invalid --options: {e}")),
        None => Ok(ReadOptions::default()),
    }
}

fn usage() -> &'static str {
    "\
arrow_file_inspect\n\
\n\
Decodes an Arrow IPC file and prints its schema and record batches as JSON.\n\
\n\
Args:\n\
  --file PATH         (required)\n\
  --options JSON      ReadOptions, e.g. '{\"check_footer_schema\":false}'\n\
  --max-rows N        rows printed per batch (default: 20)\n\
  --partial           keep batches decoded before a failure\n\
  --random-access     read batches through the footer blocks\n\
\n\
Logging is controlled by RUST_LOG.\n"
}

fn batch_json(batch: &RecordBatch<'_>, max_rows: usize) -> Json {
    let columns: Vec<Json> = batch
        .schema()
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, col)| {
            let values: Vec<Json> = col
                .iter()
                .take(max_rows)
                .map(|v| serde_json::to_value(v).unwrap_or(Json::Null))
                .collect();
            json!({
                "name": field.name,
                "type": field.data_type.name(),
                "null_count": col.null_count(),
                "values": values,
            })
        })
        .collect();
    json!({ "rows": batch.num_rows(), "columns": columns })
}

fn run(args: &[String]) -> Result<Json, String> {
    let path = parse_arg(args, "--file").ok_or("missing --file")?;
    let options = parse_options(args)?;
    let max_rows = parse_max_rows(args)?;

    let bytes = std::fs::read(&path).map_err(|e| format!("read {path} failed: {e}"))?;
    let reader = FileReader::with_options(&bytes, options).map_err(|e| e.to_string())?;
    log::info!(
        "{path}: {} bytes, {} record batch blocks",
        reader.file_len(),
        reader.num_record_batches()
    );

    let PartialRead {
        schema,
        batches,
        error,
    } = if args.iter().any(|a| a == "--random-access") {
        let schema = reader.footer_schema().map_err(|e| e.to_string())?;
        let batches = reader
            .record_batches()
            .collect::<arrow_format_reader::Result<Vec<_>>>()
            .map_err(|e| e.to_string())?;
        PartialRead {
            schema,
            batches,
            error: None,
        }
    } else if args.iter().any(|a| a == "--partial") {
        reader.read_partial()
    } else {
        let contents = reader.read().map_err(|e| e.to_string())?;
        PartialRead {
            schema: contents.schema,
            batches: contents.batches,
            error: None,
        }
    };

    Ok(json!({
        "file": path,
        "options": options,
        "schema": schema.as_deref(),
        "batches": batches.iter().map(|b| batch_json(b, max_rows)).collect::<Vec<_>>(),
        "error": error.map(|e| e.to_string()),
    }))
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprint!("{}", usage());
        std::process::exit(0);
    }

    match run(&args) {
        Ok(out) => match serde_json::to_string_pretty(&out) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("error: {e}");
            eprint!("{}", usage());
            std::process::exit(1);
        }
    }
}
