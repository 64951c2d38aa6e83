use ip2dat::{build_location, Searcher};
use std::path::Path;

fn main() {
    println!("Simple ip2dat usage example\n");

    let input = Path::new("demos/sample_location.txt");
    let output = Path::new("demos/sample_location.dat");

    let report = build_location(input, output).expect("build location dataset");
    println!(
        "built {} ({} ranges, {} pool entries, {} warnings)\n",
        output.display(),
        report.ranges_written,
        report.pool_entries,
        report.warnings.len()
    );

    let searcher = Searcher::open(output).expect("open dataset");

    let test_ips = vec!["1.0.0.1", "1.0.1.1", "9.9.9.9"];
    println!("Testing addresses:\n");
    for ip in test_ips {
        let attr = searcher.lookup(ip);
        if attr.is_empty() {
            println!("  {ip} -> no match");
        } else {
            println!("  {ip} -> {attr}");
        }
    }
}
