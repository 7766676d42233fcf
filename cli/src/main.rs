use std::env;
use std::io;
use std::io::Write;
use std::process;

use semparse::utils::tokenize;
use semparse::{Err, Grammar};
use tracing_subscriber::EnvFilter;

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} FILE [options]

Options:
  -h, --help    Print this message
  -c, --chart   Print the parse chart (defaults to not printing)
  -n, --no-sem  Don't print semantics (defaults to printing)

Set RUST_LOG to change the log level (defaults to info).",
    prog_name
  )
}

fn parse(g: &Grammar, sentence: &str, print_chart: bool, print_sem: bool) -> Result<(), Err> {
  let tokens = tokenize(sentence);

  if print_chart {
    println!("chart:\n{}\n", g.parse_chart(&tokens));
  }

  let parses = g.parse_tokens(&tokens);

  println!(
    "Parsed {} tree{}",
    parses.len(),
    if parses.len() == 1 { "" } else { "s" }
  );

  for d in parses {
    println!("{}", d);
    if print_sem {
      println!("= {}", d.semantics());
    }
    println!();
  }

  Ok(())
}

struct Args {
  filename: String,
  print_sem: bool,
  print_chart: bool,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    let mut iter = v.into_iter();
    let Some(prog_name) = iter.next() else {
      return Err(Self::make_error_message("bad argument vector", "semparse"));
    };

    let mut filename: Option<String> = None;
    let mut print_sem = true; // default to printing semantics
    let mut print_chart = false; // default to *not* printing the chart

    for o in iter {
      if o == "-h" || o == "--help" {
        println!("{}", usage(&prog_name));
        process::exit(0);
      } else if o == "-n" || o == "--no-sem" {
        print_sem = false;
      } else if o == "-c" || o == "--chart" {
        print_chart = true;
      } else if filename.is_none() {
        filename = Some(o);
      } else {
        return Err(Self::make_error_message("invalid arguments", prog_name));
      }
    }

    if let Some(filename) = filename {
      Ok(Self {
        filename,
        print_sem,
        print_chart,
      })
    } else {
      Err(Self::make_error_message("missing filename", prog_name))
    }
  }
}

fn main() -> Result<(), Err> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .init();

  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  let g = Grammar::read_from_file(&opts.filename)?;

  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    match io::stdin().read_line(&mut input) {
      Ok(_) => {
        if input.is_empty() {
          // ctrl+d
          return Ok(());
        }
        input.make_ascii_lowercase();
        parse(&g, input.trim(), opts.print_chart, opts.print_sem)?;
        input.clear();
      }
      Err(error) => return Err(error.into()),
    }
  }
}
