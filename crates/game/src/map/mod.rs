mod asteroid_field;

pub use asteroid_field::{Asteroid, AsteroidField, AsteroidFieldConfig};
