//! Reader example: follows the combined map of one DM
//!
//! Run the server first, then:
//!   cargo run -p mdm_shm --example shm_reader -- dm1

use mdm::shm::consts::DEFAULT_SHM_DIR;
use mdm_shm::{ImageReader, ShmResult};
use std::path::Path;
use std::time::Duration;

fn main() -> ShmResult<()> {
    let name = std::env::args().nth(1).unwrap_or_else(|| "dm1".to_string());

    println!("Attaching to '{name}' in {DEFAULT_SHM_DIR}...");
    let mut reader = ImageReader::attach(Path::new(DEFAULT_SHM_DIR), &name)?;
    let shape = reader.shape();
    println!("{}x{} image, counter {}", shape.width, shape.height, reader.counter());
    println!("Waiting for updates (Ctrl-C to exit)...");

    loop {
        if !reader.wait_for_update(Duration::from_secs(1)) {
            continue;
        }
        let frame = reader.read()?;
        let max = frame.iter().copied().fold(0.0, f64::max);
        let active = frame.iter().filter(|&&v| v != 0.0).count();
        println!(
            "update #{}: {} active cells, max {:.3}",
            reader.version(),
            active,
            max
        );
    }
}
