use crate::error::Result;
use exen::core::forcefield::energy::InteractionCategory;

pub fn run() -> Result<()> {
    println!("Interaction categories:");
    for category in InteractionCategory::ALL {
        println!("  {}", category.name());
    }
    println!();
    println!("Schedule forms:");
    println!("  1              held fully coupled at every lambda");
    println!("  lambda         linear interpolation");
    println!("  lambda^2       quadratic interpolation");
    println!("  sqrt(lambda)   square-root interpolation");
    Ok(())
}
