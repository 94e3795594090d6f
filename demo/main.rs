use dynbvh::{BatchBuilder, BoundingVolume, DynamicTree};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::io::Write;
use tracing::info;

const SPHERES: usize = 1000;
const RAY_LENGTH: f64 = 1000.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Scatter random spheres and keep their bounding boxes
    let mut rng = StdRng::seed_from_u64(0);
    let mut objects = Vec::new();
    for id in 0..SPHERES {
        let center: [f64; 3] = [
            rng.gen_range(-100.0..100.0),
            rng.gen_range(-100.0..100.0),
            rng.gen_range(-100.0..100.0),
        ];
        let radius = rng.gen_range(0.5..3.0) * 0.5;
        let min = center.map(|x| x - radius);
        let max = center.map(|x| x + radius);
        let bounds = BoundingVolume::try_new(min, max)?;
        objects.push((id, bounds));
    }

    // Insert them one by one
    let mut tree = DynamicTree::new();
    for (id, bounds) in &objects {
        tree.insert_leaf(*id, *bounds)?;
    }
    info!(
        leaves = tree.len(),
        height = tree.height(),
        capacity = tree.capacity(),
        cost = tree.total_perimeter(),
        "dynamic tree built"
    );

    // Cast a ray from the origin along +z
    let origin = [0.0, 0.0, -RAY_LENGTH * 0.5];
    let target = [0.0, 0.0, RAY_LENGTH * 0.5];
    let hits = tree.raycast(&origin, &target);
    info!(hits = hits.len(), "raycast");
    if let Some((closest, t)) = tree.raycast_closest(&origin, &target) {
        info!(object = closest.data_id, distance = t * RAY_LENGTH, "closest hit");
    }

    let nearby = tree.intersects(&origin, &target);
    info!(candidates = nearby.len(), "overlap query");

    // The same scene through the batch builder
    let batch = BatchBuilder::new().build(objects.iter().copied())?;
    info!(
        roots = batch.roots().len(),
        height = batch.height(),
        hits = batch.raycast(&origin, &target).len(),
        "batch tree built"
    );

    // Optionally dump every node for plotting
    if let Some(filename) = std::env::args().nth(1) {
        let mut file = std::fs::File::create(&filename)?;
        for row in tree.nodes_to_string_rows() {
            writeln!(file, "{row}")?;
        }
        info!(%filename, "nodes written");
    }
    Ok(())
}
