//! Simple executable producing output in awkward ways. Used for testing.

use anyhow::Context;

use std::{
    env,
    io::{self, BufRead, Write},
    process, thread,
    time::Duration,
};

fn parse_arg<T>(args: &mut impl Iterator<Item = String>, name: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let arg = args.next().with_context(|| format!("missing {name}"))?;
    arg.parse()
        .with_context(|| format!("cannot parse {name} from `{arg}`"))
}

/// Writes `data` and flushes it, so that it is delivered as a separate chunk.
fn emit(writer: &mut impl Write, data: &[u8]) -> io::Result<()> {
    writer.write_all(data)?;
    writer.flush()
}

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let mode = args.next().context("missing mode")?;
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    match mode.as_str() {
        // Line without a trailing newline on stdout, plus a complete stderr line.
        "partial" => {
            emit(&mut stdout, b"no newline")?;
            emit(&mut stderr, b"err line\n")?;
        }
        // CRLF line endings split between writes.
        "crlf" => {
            emit(&mut stdout, b"one\r")?;
            thread::sleep(Duration::from_millis(50));
            emit(&mut stdout, b"\ntwo\r\n")?;
        }
        // Line fragments written with pauses in between.
        "fragments" => {
            for fragment in [&b"Hel"[..], b"lo, ", b"world!\nBye", b"!\n"] {
                emit(&mut stdout, fragment)?;
                thread::sleep(Duration::from_millis(30));
            }
        }
        "silent" => {
            let secs: f64 = parse_arg(&mut args, "seconds")?;
            emit(&mut stdout, b"start\n")?;
            thread::sleep(Duration::from_secs_f64(secs));
            emit(&mut stdout, b"end\n")?;
        }
        "ticks" => {
            let count: usize = parse_arg(&mut args, "tick count")?;
            let interval: u64 = parse_arg(&mut args, "interval")?;
            for i in 0..count {
                emit(&mut stdout, format!("tick #{i}\n").as_bytes())?;
                thread::sleep(Duration::from_millis(interval));
            }
        }
        "echo" => {
            for line in io::stdin().lock().lines() {
                let line = line?;
                emit(&mut stdout, format!("got: {line}\n").as_bytes())?;
            }
            emit(&mut stderr, b"stdin closed\n")?;
        }
        "exit" => {
            let code: i32 = parse_arg(&mut args, "exit code")?;
            emit(&mut stderr, format!("exiting with {code}\n").as_bytes())?;
            process::exit(code);
        }
        "env" => {
            let name: String = parse_arg(&mut args, "variable name")?;
            match env::var(&name) {
                Ok(value) => println!("{name}={value:?}"),
                Err(_) => println!("{name} is unset"),
            }
        }
        "args" => {
            for arg in args {
                println!("{arg}");
            }
        }
        _ => anyhow::bail!("unknown mode: {mode}"),
    }
    Ok(())
}
