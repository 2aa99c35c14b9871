use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use structopt::StructOpt;

use drinks::catalog::{
    Catalog, ImportCatalog, ListDrinks, ListGlasses, ListIngredients, ShowDrink, ShowGlass,
    ShowIngredient,
};
use drinks::services::{Commandable, Queryable};
use drinks::{Backend, Config};
use infra::persistence::Store;

#[derive(Debug, StructOpt)]
#[structopt(name = "rb", about = "Drinks catalog CLI")]
struct Opt {
    /// Configuration file
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,
    #[structopt(subcommand)]
    command: Commands,
}

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "setup", about = "Initialize the store")]
    Setup,
    #[structopt(name = "import", about = "Load a catalog dump")]
    Import {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    #[structopt(name = "drinks", about = "List drinks")]
    Drinks {
        #[structopt(long)]
        name: Option<String>,
    },
    #[structopt(name = "drink", about = "Show one drink")]
    Drink { name: String },
    #[structopt(name = "ingredients", about = "List ingredients")]
    Ingredients {
        #[structopt(long)]
        name: Option<String>,
    },
    #[structopt(name = "ingredient", about = "Show one ingredient")]
    Ingredient { name: String },
    #[structopt(name = "glasses", about = "List glasses")]
    Glasses {
        #[structopt(long)]
        name: Option<String>,
    },
    #[structopt(name = "glass", about = "Show one glass")]
    Glass { name: String },
}

fn main() -> Result<()> {
    let opt = Opt::from_args();
    let config = Config::load(opt.config.as_deref())?;
    config.logging.builder().init();

    match config.store.open()? {
        Backend::Postgres(catalog) => run(&catalog, opt.command),
        Backend::Memory(catalog) => run(&catalog, opt.command),
    }
}

fn run<M, D>(catalog: &Catalog<M>, command: Commands) -> Result<()>
where
    M: r2d2::ManageConnection<Connection = D>,
    D: Store + Send + 'static,
{
    match command {
        Commands::Setup => catalog.setup()?,
        Commands::Import { file } => {
            catalog.setup()?;
            print(&catalog.execute(ImportCatalog::from_path(&file)?)?)?
        }
        Commands::Drinks { name } => print(&catalog.query(ListDrinks { name })?)?,
        Commands::Drink { name } => print(&catalog.query(ShowDrink { name })?)?,
        Commands::Ingredients { name } => print(&catalog.query(ListIngredients { name })?)?,
        Commands::Ingredient { name } => print(&catalog.query(ShowIngredient { name })?)?,
        Commands::Glasses { name } => print(&catalog.query(ListGlasses { name })?)?,
        Commands::Glass { name } => print(&catalog.query(ShowGlass { name })?)?,
    }

    Ok(())
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
