//! Command-line front end: assemble a source file, print the listing, and
//! optionally write a relocatable ELF64 object.

use std::env;
use std::fs;
use std::process::ExitCode;

use relasm::Assembler;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let (input, output) = match args.as_slice() {
        [_, input] => (input, None),
        [_, input, output] => (input, Some(output)),
        _ => {
            eprintln!("usage: relasm <input.asm> [output.o]");
            return ExitCode::FAILURE;
        }
    };

    let source = match fs::read_to_string(input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("failed to read `{input}`: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut asm = Assembler::new();
    if let Err(err) = asm.assemble(&source) {
        // Show how far assembly got before the failure.
        print!("{}", asm.listing());
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    print!("{}", asm.listing());

    if let Some(path) = output {
        let object = match asm.object() {
            Ok(object) => object,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(err) = fs::write(path, &object) {
            eprintln!("failed to write `{path}`: {err}");
            return ExitCode::FAILURE;
        }
        println!("Wrote {} bytes to `{}`.", object.len(), path);
    }

    ExitCode::SUCCESS
}
