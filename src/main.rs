use std::env;
use std::process::exit;
use vipr::{checker, completer, incompletify};

fn main() {
  let mut args = env::args().skip(1);
  let result = match args.next().as_deref() {
    Some("verify") => checker::main(args),
    Some("complete") => completer::main(args),
    Some("incompletify") => incompletify::main(args),
    _ => {
      eprintln!("usage: vipr <subcommand> ...");
      eprintln!("subcommands:");
      eprintln!("  verify <certificate>");
      eprintln!("  complete [--soplex=on|off] [--debugmode=on|off] [--verbosity=0..5] \
[--threads=N] [--outfile=PATH] <certificate>");
      eprintln!("  incompletify <certificate> [percent 0..100] [incomplete|weak] [all|noobj]");
      exit(1);
    }
  };
  if let Err(e) = result {
    eprintln!("{}", e);
    exit(1);
  }
}
