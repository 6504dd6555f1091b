use log::info;
use pagealloc::{AllocError, Allocator, MemoryConfig, VecMemory};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ROUNDS: usize = 100_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let seed = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<u64>())
        .transpose()?
        .unwrap_or(7);

    let config = MemoryConfig {
        initial_pages: 2,
        maximum_pages: 256,
        heap_base: 1024,
    };
    let mut heap = Allocator::new(VecMemory::new(config)?);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut live = vec![];
    let mut failed = 0;

    for round in 0..ROUNDS {
        if live.is_empty() || rng.gen_bool(0.52) {
            let size = if rng.gen_bool(0.85) {
                rng.gen_range(1..=256)
            } else {
                rng.gen_range(257..=32 * 1024)
            };

            match heap.allocate(size) {
                Ok(Some(addr)) => live.push(addr),
                Ok(None) => {}
                Err(AllocError::OutOfMemory { .. }) => failed += 1,
                Err(err) => return Err(err.into()),
            }
        } else {
            let victim = rng.gen_range(0..live.len());
            heap.deallocate(live.swap_remove(victim))?;
        }

        if round % 10_000 == 0 {
            heap.check_integrity()?;
            info!("round {}: {} live, {:?}", round, live.len(), heap.stats());
        }
    }

    let stats = heap.stats();
    println!("seed:                {}", seed);
    println!("allocations:         {}", stats.allocations);
    println!("deallocations:       {}", stats.deallocations);
    println!("live:                {}", stats.live_allocations());
    println!("failed allocations:  {}", failed);
    println!("small refills:       {}", stats.small_refills);
    println!("grow requests:       {}", stats.grow_requests);
    println!("refused grows:       {}", stats.refused_grow_requests);
    println!(
        "memory pages:        {} of {}",
        stats.memory_pages,
        heap.memory().maximum_pages()
    );
    println!("granted bytes:       {}", stats.granted_bytes);
    println!(
        "free large objects:  {}",
        heap.large_free_list()?.len()
    );

    Ok(())
}
