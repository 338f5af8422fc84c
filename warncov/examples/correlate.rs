#[macro_use]
extern crate error_chain;
extern crate env_logger;
extern crate warncov;

use warncov::{Config, Result, Session};
use warncov::report::{Report, ReportOptions};

use std::env;
use std::io::stdout;
use std::path::{Path, PathBuf};

quick_main!(run);

/// Usage: `correlate [CONFIG.toml] INPUT...`
///
/// Set `WARNCOV_TRACES` and `WARNCOV_ADDR2LINE` to also decide the reachability of not covered warnings.
fn run() -> Result<()> {
    env_logger::init();

    let mut args = env::args_os().skip(1).map(PathBuf::from).peekable();
    let config = match args.peek() {
        Some(path) if path.extension().map_or(false, |e| e == "toml") => Some(Config::from_toml_file(path)?),
        _ => None,
    };
    let config = match config {
        Some(config) => {
            args.next();
            config
        },
        None => Config::default(),
    };

    let mut session = Session::new(config)?;
    for input in args {
        session.add_input(&input, None)?;
    }

    let correlation = session.correlation();
    let mut report = Report::new(&correlation, &ReportOptions::default());

    if let (Some(traces), Some(addr2line)) = (env::var_os("WARNCOV_TRACES"), env::var_os("WARNCOV_ADDR2LINE")) {
        let graph = session.load_traces(Path::new(&traces))?;
        let addrs = session.load_addr_info(Path::new(&addr2line))?;
        let verdicts = session.reachability(&correlation, &graph, &addrs);
        report = report.with_reachability(&correlation, &verdicts);
    }

    session.finish()?;
    report.write_json(stdout())?;
    Ok(())
}
