mod battery;
mod command;
mod session;

use std::io::{self, BufRead, Write};
use std::process;

use command::Command;
use session::Session;

fn main() -> io::Result<()> {
    let mut session = Session::new().unwrap_or_else(|err| {
        eprintln!("invalid emulated battery profile: {err}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut line = String::new();

    writeln!(
        writer,
        "Fuel Gauge Emulator ready. Type `help` for commands or `exit` to quit."
    )?;
    for response in session.power_on() {
        writeln!(writer, "{response}")?;
    }

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let command = match command::parse(trimmed) {
            Ok(command) => command,
            Err(err) => {
                writeln!(writer, "ERR syntax {err}")?;
                continue;
            }
        };
        let terminate = command == Command::Exit;

        for response in session.execute(command) {
            writeln!(writer, "{response}")?;
        }
        if terminate {
            break;
        }
    }

    Ok(())
}
