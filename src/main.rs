use anyhow::anyhow;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use musicatalog::api_client::{SortDirection, SortField, SortOrder};
use musicatalog::configuration::{create_config, ConfigFolder};
use musicatalog::startup::{self, Command as CatalogCommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("musicatalog=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = cli().get_matches();
    let cfg_folder = ConfigFolder::new()?;

    match args.subcommand() {
        Some(("config", _)) => {
            println!("\x1b[1m\x1b[34mConfiguring musicatalog...\x1b[0m");
            create_config(&cfg_folder).map_err(|e| anyhow!("{e}"))
        }
        Some((name, sub)) => match parse_command(name, sub) {
            Some(command) => startup::run(cfg_folder, command).await,
            None => {
                print_usage();
                Ok(())
            }
        },
        None => {
            print_usage();
            Ok(())
        }
    }
}

fn id_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .help(help)
        .required(true)
        .value_parser(value_parser!(i64))
}

fn text_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).help(help).required(true)
}

fn page_arg(default: &'static str) -> Arg {
    Arg::new("page")
        .long("page")
        .short('p')
        .value_parser(value_parser!(u32))
        .default_value(default)
}

fn cli() -> Command {
    Command::new("musicatalog")
        .about("🎵 Client for the music catalog API 🎵")
        .subcommand(Command::new("config").about("🛠️ Create or update the configuration file"))
        .subcommand(
            Command::new("login")
                .about("🔑 Sign in and store the session")
                .arg(text_arg("username", "User name"))
                .arg(Arg::new("password").long("password").help("Prompted when omitted")),
        )
        .subcommand(Command::new("logout").about("🚪 End the session"))
        .subcommand(Command::new("whoami").about("👤 Show the current session"))
        .subcommand(
            Command::new("artists")
                .about("🎤 List artists")
                .arg(Arg::new("search").long("search").short('s'))
                .arg(page_arg("1"))
                .arg(
                    Arg::new("size")
                        .long("size")
                        .value_parser(value_parser!(u32)),
                )
                .arg(
                    Arg::new("sort")
                        .long("sort")
                        .value_parser(["id", "name"])
                        .default_value("id"),
                )
                .arg(Arg::new("desc").long("desc").action(ArgAction::SetTrue)),
        )
        .subcommand(
            Command::new("artist")
                .about("🎤 Show an artist and its albums")
                .arg(id_arg("id", "Artist id"))
                .arg(page_arg("0").help("Album page, starting at 0")),
        )
        .subcommand(
            Command::new("albums")
                .about("💿 List an artist's albums")
                .arg(id_arg("artist_id", "Artist id"))
                .arg(page_arg("0").help("Album page, starting at 0")),
        )
        .subcommand(
            Command::new("images")
                .about("🖼️ List an album's images")
                .arg(id_arg("album_id", "Album id")),
        )
        .subcommand(
            Command::new("artist-create")
                .about("➕ Create an artist")
                .arg(text_arg("name", "Artist name")),
        )
        .subcommand(
            Command::new("artist-update")
                .about("✏️ Rename an artist")
                .arg(id_arg("id", "Artist id"))
                .arg(text_arg("name", "New name")),
        )
        .subcommand(
            Command::new("album-create")
                .about("➕ Create an album")
                .arg(id_arg("artist_id", "Artist id"))
                .arg(text_arg("title", "Album title")),
        )
        .subcommand(
            Command::new("album-update")
                .about("✏️ Update an album")
                .arg(id_arg("id", "Album id"))
                .arg(id_arg("artist_id", "Artist id"))
                .arg(text_arg("title", "Album title")),
        )
        .subcommand(
            Command::new("upload")
                .about("⬆️ Upload cover images from a file or folder")
                .arg(id_arg("album_id", "Album id"))
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("default")
                        .long("default")
                        .help("Use the first uploaded image as cover")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("set-default")
                .about("⭐ Choose an album's cover image")
                .arg(id_arg("album_id", "Album id"))
                .arg(id_arg("image_id", "Image id")),
        )
        .subcommand(Command::new("watch").about("🔔 Stream album notifications until Ctrl-C"))
}

fn parse_command(name: &str, args: &ArgMatches) -> Option<CatalogCommand> {
    let id = |key: &str| args.get_one::<i64>(key).copied();
    let text = |key: &str| args.get_one::<String>(key).cloned();
    let page = || args.get_one::<u32>("page").copied();

    let command = match name {
        "login" => CatalogCommand::Login {
            username: text("username")?,
            password: text("password"),
        },
        "logout" => CatalogCommand::Logout,
        "whoami" => CatalogCommand::WhoAmI,
        "artists" => CatalogCommand::Artists {
            search: text("search").unwrap_or_default(),
            page: page()?,
            size: args.get_one::<u32>("size").copied(),
            sort: SortOrder {
                field: match text("sort").as_deref() {
                    Some("name") => SortField::Name,
                    _ => SortField::Id,
                },
                direction: if args.get_flag("desc") {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                },
            },
        },
        "artist" => CatalogCommand::Artist {
            id: id("id")?,
            album_page: page()?,
        },
        "albums" => CatalogCommand::Albums {
            artist_id: id("artist_id")?,
            page: page()?,
        },
        "images" => CatalogCommand::Images {
            album_id: id("album_id")?,
        },
        "artist-create" => CatalogCommand::ArtistCreate {
            name: text("name")?,
        },
        "artist-update" => CatalogCommand::ArtistUpdate {
            id: id("id")?,
            name: text("name")?,
        },
        "album-create" => CatalogCommand::AlbumCreate {
            artist_id: id("artist_id")?,
            title: text("title")?,
        },
        "album-update" => CatalogCommand::AlbumUpdate {
            id: id("id")?,
            artist_id: id("artist_id")?,
            title: text("title")?,
        },
        "upload" => CatalogCommand::Upload {
            album_id: id("album_id")?,
            path: args.get_one::<PathBuf>("path").cloned()?,
            set_default: args.get_flag("default"),
        },
        "set-default" => CatalogCommand::SetDefault {
            album_id: id("album_id")?,
            image_id: id("image_id")?,
        },
        "watch" => CatalogCommand::Watch,
        _ => return None,
    };
    Some(command)
}

fn print_usage() {
    println!("\x1b[1m\x1b[31mInvalid command!\x1b[0m\n");
    println!("📖 Common Commands:");
    println!("  \x1b[1m\x1b[32mmusicatalog config\x1b[0m          - 🛠️  Create or update configuration file");
    println!("  \x1b[1m\x1b[32mmusicatalog login <user>\x1b[0m    - 🔑 Sign in");
    println!("  \x1b[1m\x1b[32mmusicatalog artists\x1b[0m         - 🎤 Browse artists");
    println!("  \x1b[1m\x1b[32mmusicatalog watch\x1b[0m           - 🔔 Follow album notifications");
    println!("\x1b[33mRun 'musicatalog --help' for every command.\x1b[0m\n");
}
