// Entry point and interactive menu.
//
// - Option [1] loads both CSV files and computes the RFM table.
// - Option [2] picks which segments the report shows.
// - Option [3] renders the report for the current selection.
// - Option [4] pages through the filtered customers.
// - Option [5] exports the filtered customers and summary.
// - Option [6] drops the cached input and loads again.
use anyhow::{Context, Result};
use rfm_report::config::{AppConfig, DEFAULT_CONFIG_PATH};
use rfm_report::loader::DataCache;
use rfm_report::reports::{build_report, generate_summary, page_count, parse_selection};
use rfm_report::rfm::{compute_rfm, RfmTable};
use rfm_report::{output, util};
use std::io::{self, Write};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Everything the menu needs between choices. The RFM table is rebuilt on
/// every load; the filtered report is rebuilt on every render.
struct Session {
    config: AppConfig,
    cache: DataCache,
    table: Option<RfmTable>,
    selected: Vec<String>,
}

/// Print `prompt` and read one trimmed line. `None` on end of input.
fn read_line(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

impl Session {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            cache: DataCache::new(),
            table: None,
            selected: Vec::new(),
        }
    }

    /// Handle option [1]: load (or reuse) the input tables and score them.
    fn handle_load(&mut self) {
        let orders_path = self.config.input.orders_path.clone();
        let payments_path = self.config.input.payments_path.clone();
        let loaded = self
            .cache
            .get_or_load(&orders_path, &payments_path)
            .and_then(|(dataset, load_report)| {
                output::print_load_report(load_report);
                compute_rfm(dataset, &self.config)
            });
        match loaded {
            Ok(table) => {
                println!(
                    "RFM table ready: {} customers.\n",
                    util::format_int(table.rows.len())
                );
                self.selected = table.segments_present();
                self.table = Some(table);
            }
            Err(e) => {
                error!("Load failed: {}", e);
                eprintln!("Failed to load data: {}\n", e);
                self.table = None;
                self.selected.clear();
            }
        }
    }

    fn loaded_table(&self) -> Option<&RfmTable> {
        if self.table.is_none() {
            println!("Error: No data loaded. Please load the data first (option 1).\n");
        }
        self.table.as_ref()
    }

    /// Handle option [2]: choose the segments to show.
    fn handle_select(&mut self) {
        let Some(table) = self.loaded_table() else {
            return;
        };
        let available = table.segments_present();
        println!("Segments:");
        for (i, label) in available.iter().enumerate() {
            let mark = if self.selected.contains(label) { "x" } else { " " };
            println!("[{}] [{}] {}", i + 1, mark, label);
        }
        let Some(input) = read_line("Enter segment numbers (e.g. 1,3) or press Enter for all: ")
        else {
            return;
        };
        match parse_selection(&input, &available) {
            Ok(selected) => {
                println!("Showing: {}\n", selected.join(", "));
                self.selected = selected;
            }
            Err(e) => println!("{}. Keeping the previous selection.\n", e),
        }
    }

    /// Handle option [3]: filter and print the full report.
    fn handle_report(&self) {
        let Some(table) = self.loaded_table() else {
            return;
        };
        let report = build_report(table, &self.selected, self.config.report.histogram_bins);
        println!();
        output::print_report(table, &report, self.config.report.page_size);
    }

    /// Handle option [4]: page through the filtered customers.
    fn handle_browse(&self) {
        let Some(table) = self.loaded_table() else {
            return;
        };
        let page_size = self.config.report.page_size;
        let report = build_report(table, &self.selected, self.config.report.histogram_bins);
        let pages = page_count(report.rows.len(), page_size);
        let mut current = 0usize;
        loop {
            output::print_page(&report, current, page_size);
            let Some(cmd) = read_line("[n]ext, [p]revious, page number, or [q]uit: ") else {
                return;
            };
            match cmd.to_lowercase().as_str() {
                "n" | "" => current = (current + 1).min(pages - 1),
                "p" => current = current.saturating_sub(1),
                "q" => break,
                other => match other.parse::<usize>() {
                    Ok(n) if (1..=pages).contains(&n) => current = n - 1,
                    _ => println!("Invalid choice. Enter n, p, q or 1..={}.", pages),
                },
            }
        }
        println!();
    }

    /// Handle option [5]: write the filtered customers as CSV and the
    /// summary as JSON.
    fn handle_export(&self) {
        let Some(table) = self.loaded_table() else {
            return;
        };
        let report = build_report(table, &self.selected, self.config.report.histogram_bins);
        let csv_path = &self.config.report.export_csv;
        let json_path = &self.config.report.export_json;
        if let Err(e) = output::write_csv(csv_path, &report.rows) {
            eprintln!("Write error: {}", e);
            return;
        }
        if let Err(e) = output::write_json(json_path, &generate_summary(table, &report)) {
            eprintln!("Write error: {}", e);
            return;
        }
        println!(
            "Exported {} customers to {} and the summary to {}.\n",
            util::format_int(report.rows.len()),
            csv_path.display(),
            json_path.display()
        );
    }

    /// Handle option [6]: forget the cached input and load again.
    fn handle_reload(&mut self) {
        self.cache.invalidate();
        self.handle_load();
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rfm_report=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let config = AppConfig::load_or_default(DEFAULT_CONFIG_PATH)
        .with_context(|| format!("reading {}", DEFAULT_CONFIG_PATH))?;
    debug!(?config, "Configuration");

    let mut session = Session::new(config);
    loop {
        println!("RFM Analysis Dashboard");
        println!("[1] Load the data");
        println!("[2] Select segments");
        println!("[3] Show report");
        println!("[4] Browse customers");
        println!("[5] Export filtered customers");
        println!("[6] Reload data");
        println!("[0] Exit\n");
        let Some(choice) = read_line("Enter choice: ") else {
            break;
        };
        match choice.as_str() {
            "1" => session.handle_load(),
            "2" => session.handle_select(),
            "3" => session.handle_report(),
            "4" => session.handle_browse(),
            "5" => session.handle_export(),
            "6" => session.handle_reload(),
            "0" => break,
            _ => println!("Invalid choice. Please enter 0-6.\n"),
        }
    }
    println!("Exiting the program.");
    Ok(())
}
