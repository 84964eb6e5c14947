use clap::{Arg, ArgAction, Command};
use std::io::{self, Write};

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .about("Write a synthetic CSV upload to stdout")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("with_header")
                .long("with-header")
                .action(ArgAction::SetTrue),
        )
        .arg(Arg::new("cols").long("cols").default_value("3"))
        .arg(Arg::new("delim").long("delim").default_value(","))
        .arg(
            Arg::new("quoted_every")
                .long("quoted-every")
                .help("Every Nth row gets a quoted field holding the delimiter and a line break")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("empty_every")
                .long("empty-every")
                .help("Every Nth row leaves its last field empty")
                .value_parser(clap::value_parser!(u64)),
        )
        .get_matches();

    let rows: u64 = matches.get_one::<u64>("rows").copied().unwrap_or(0);
    let with_header = matches.get_flag("with_header");
    let cols: usize = matches
        .get_one::<String>("cols")
        .map(String::as_str)
        .unwrap_or("3")
        .parse()?;
    let delim = matches
        .get_one::<String>("delim")
        .map(String::as_str)
        .unwrap_or(",");
    let quoted_every = matches.get_one::<u64>("quoted_every").copied();
    let empty_every = matches.get_one::<u64>("empty_every").copied();

    let mut out = io::BufWriter::new(io::stdout().lock());

    if with_header {
        write!(&mut out, "id")?;
        for i in 1..cols {
            write!(&mut out, "{}col{}", delim, i)?;
        }
        writeln!(&mut out)?;
    }

    // Deterministic data: id, v1_i, v2_i, ...
    for i in 0..rows {
        write!(&mut out, "ID{:010}", i)?;
        for c in 1..cols {
            let last = c + 1 == cols;
            if last && empty_every.is_some_and(|n| n > 0 && i % n == 0) {
                write!(&mut out, "{}", delim)?;
            } else if c == 1 && quoted_every.is_some_and(|n| n > 0 && i % n == 0) {
                write!(&mut out, "{}\"v{}{}{}\nline \"\"{}\"\"\"", delim, c, delim, i, i)?;
            } else {
                write!(&mut out, "{}v{}_{}", delim, c, i)?;
            }
        }
        writeln!(&mut out)?;
        if i % 10_000 == 0 {
            out.flush()?;
        } // keep buffers moving on huge runs
    }

    out.flush()?;
    Ok(())
}
