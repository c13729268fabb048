/*!
Generate a fake daily VIX-like series as a FRED CSV export
*/
use chrono::NaiveDate;
use clap::{App, Arg};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;
use rustyline::error::ReadlineError;
use rustyline::Editor;
use std::io::stdout;
use vixburn::data::fake::*;
use vixburn::data::fred::{write_series, FRED_DATE};
use vixburn::data::TimeSeries;

fn prompt_points() -> Option<usize> {
    let mut rl = Editor::<()>::new();
    loop {
        match rl.readline("Points to generate: ") {
            Ok(line) => match line.trim().parse() {
                Ok(points) => return Some(points),
                Err(_) => eprintln!("Invalid input: {:?}", line),
            },
            Err(ReadlineError::Interrupted) => {
                eprintln!("CTRL-C");
                return None;
            }
            Err(ReadlineError::Eof) => {
                eprintln!("CTRL-D");
                return None;
            }
            Err(err) => eprintln!("Error: {:?}", err),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let matches = App::new("fakegen")
        .about("Writes a random walk resembling the VIX to stdout, in FRED CSV format")
        .arg(
            Arg::with_name("POINTS")
                .help("How many daily points to generate. Prompted for if not given")
                .index(1),
        )
        .arg(Arg::with_name("seed").long("seed").takes_value(true))
        .get_matches();
    env_logger::init();

    let points = match matches.value_of("POINTS") {
        Some(points) => points.parse()?,
        None => match prompt_points() {
            Some(points) => points,
            None => return Ok(()),
        },
    };
    let seed = match matches.value_of("seed") {
        Some(seed) => seed.parse()?,
        None => 42,
    };
    let walk = RandomWalk {
        rng: StdRng::seed_from_u64(seed),
        value: 20.0,
        step: Normal::new(0.0, 1.5)?,
        floor: 9.0,
    };
    let start = NaiveDate::from_ymd_opt(1990, 1, 2)
        .ok_or_else(|| anyhow::format_err!("Invalid start date"))?;
    let rows = SeriesGen::new(Weekdays(start), walk).take(points);
    let series = TimeSeries::from_rows(vec!["VIXCLS"], rows)?;
    write_series(stdout(), &series, FRED_DATE)?;
    Ok(())
}
