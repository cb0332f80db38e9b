// UI layer: the command table, interactive prompts (`dialoguer`), spinners
// (`indicatif`) and plain-text rendering of search results and carts.
// Commands are listed once in `command_table`; nothing registers itself.

use crate::api::{ApiClient, ClientConfig};
use crate::error::Error;
use crate::session::{Session, SessionStore};
use crate::types::{Cart, CartItem, Product, SearchResponse};
use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use crossterm::style::Stylize;
use dialoguer::{Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, IsTerminal, Write};
use std::time::Duration;

/// What every command gets to work with: where the session lives and how to
/// reach the service.
pub struct Invocation {
    pub store: SessionStore,
    pub config: ClientConfig,
}

impl Invocation {
    pub fn from_env() -> Result<Self> {
        Ok(Invocation {
            store: SessionStore::default_location().context("failed to locate session file")?,
            config: ClientConfig::from_env(),
        })
    }
}

/// How a command runs. Authenticated handlers receive a client seeded with
/// the saved session; the dispatcher refuses to run them without one.
#[derive(Clone, Copy)]
pub enum Handler {
    Public(fn(&Invocation, &ArgMatches) -> Result<()>),
    Authenticated(fn(&mut ApiClient, &ArgMatches) -> Result<()>),
}

/// One entry of the command table.
pub struct CommandSpec {
    pub name: &'static str,
    pub about: &'static str,
    /// Adds arguments and subcommands to the bare `clap::Command`.
    pub build: fn(Command) -> Command,
    pub handler: Handler,
}

impl CommandSpec {
    pub fn requires_session(&self) -> bool {
        matches!(self.handler, Handler::Authenticated(_))
    }
}

pub fn command_table() -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: "login",
            about: "Login to Mathem",
            build: |cmd| {
                cmd.arg(Arg::new("email").short('e').long("email").help("Email address"))
                    .arg(
                        Arg::new("password")
                            .short('p')
                            .long("password")
                            .help("Password (not recommended, use prompt instead)"),
                    )
            },
            handler: Handler::Public(login),
        },
        CommandSpec {
            name: "logout",
            about: "Logout from Mathem",
            build: |cmd| cmd,
            handler: Handler::Public(logout),
        },
        CommandSpec {
            name: "search",
            about: "Search for products",
            build: |cmd| {
                cmd.arg(
                    Arg::new("query")
                        .required(true)
                        .num_args(1..)
                        .help("Words to search for"),
                )
                .arg(
                    Arg::new("page")
                        .short('n')
                        .long("page")
                        .value_parser(value_parser!(u32))
                        .default_value("1")
                        .help("Page number"),
                )
            },
            handler: Handler::Authenticated(search),
        },
        CommandSpec {
            name: "cart",
            about: "Manage shopping cart (shows it by default)",
            build: |cmd| {
                cmd.subcommand(Command::new("show").about("Show cart contents"))
                    .subcommand(
                        Command::new("add")
                            .about("Add a product to cart by its ID from search results")
                            .arg(
                                Arg::new("product_id")
                                    .required(true)
                                    .value_parser(value_parser!(u64)),
                            )
                            .arg(
                                Arg::new("quantity")
                                    .value_parser(value_parser!(u32))
                                    .default_value("1"),
                            ),
                    )
                    .subcommand(Command::new("clear").about("Clear all items from cart"))
            },
            handler: Handler::Authenticated(cart),
        },
        CommandSpec {
            name: "version",
            about: "Print the version",
            build: |cmd| cmd,
            handler: Handler::Public(version),
        },
    ]
}

/// Turn the table into the root `clap::Command`.
pub fn build_cli(table: &[CommandSpec]) -> Command {
    let root = Command::new("mathemcli")
        .about("CLI for interacting with the Mathem grocery API")
        .long_about(
            "mathemcli is a command-line tool for searching products\n\
             and managing your shopping cart on Mathem.se.\n\n\
             Before using most commands, you need to login:\n  mathemcli login",
        )
        .subcommand_required(true)
        .arg_required_else_help(true);
    table.iter().fold(root, |root, spec| {
        root.subcommand((spec.build)(Command::new(spec.name).about(spec.about)))
    })
}

/// Run the command selected in `matches`.
pub fn dispatch(table: &[CommandSpec], inv: &Invocation, matches: &ArgMatches) -> Result<()> {
    let (name, args) = matches.subcommand().context("no command given")?;
    let spec = table
        .iter()
        .find(|spec| spec.name == name)
        .with_context(|| format!("unknown command '{name}'"))?;

    match spec.handler {
        Handler::Public(run) => run(inv, args),
        Handler::Authenticated(run) => {
            let session = load_session(&inv.store)?;
            let mut client = ApiClient::with_session(
                inv.config.clone(),
                &session.session_id,
                &session.csrf_token,
            )?;
            let outcome = run(&mut client, args);
            if let Err(e) = save_rotated_tokens(&inv.store, &session, &client) {
                tracing::warn!(error = %e, "could not persist refreshed session");
            }
            outcome
        }
    }
}

fn load_session(store: &SessionStore) -> Result<Session> {
    let session = store.load().context("failed to load session")?;
    match session {
        Some(session) if !session.session_id.is_empty() => Ok(session),
        _ => Err(Error::NotLoggedIn.into()),
    }
}

/// The server may rotate either cookie on any response; keep the saved copy
/// in step so the next invocation presents the current pair.
fn save_rotated_tokens(store: &SessionStore, saved: &Session, client: &ApiClient) -> Result<()> {
    if client.session_id() == saved.session_id && client.csrf_token() == saved.csrf_token {
        return Ok(());
    }
    tracing::debug!("session tokens rotated, saving");
    store.save(&client.to_session(&saved.email))?;
    Ok(())
}

/// Run `work` behind a spinner on stderr.
fn with_spinner<T>(message: &'static str, work: impl FnOnce() -> T) -> Result<T> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    let out = work();
    spinner.finish_and_clear();
    Ok(out)
}

fn login(inv: &Invocation, args: &ArgMatches) -> Result<()> {
    let email = match args.get_one::<String>("email") {
        Some(email) => email.clone(),
        None => Input::<String>::new().with_prompt("Email").interact_text()?,
    };
    // `Password` hides input in terminal for passwords.
    let password = match args.get_one::<String>("password") {
        Some(password) => password.clone(),
        None => Password::new().with_prompt("Password").interact()?,
    };

    let mut client = ApiClient::new(inv.config.clone())?;
    with_spinner("Logging in...", || client.login(&email, &password))?
        .context("login failed")?;

    inv.store
        .save(&client.to_session(&email))
        .context("failed to save session")?;
    println!("Successfully logged in as {email}");
    Ok(())
}

fn logout(inv: &Invocation, _args: &ArgMatches) -> Result<()> {
    inv.store.clear().context("failed to clear session")?;
    println!("Logged out successfully");
    Ok(())
}

fn version(_inv: &Invocation, _args: &ArgMatches) -> Result<()> {
    println!("mathemcli {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

fn search(client: &mut ApiClient, args: &ArgMatches) -> Result<()> {
    let query = args
        .get_many::<String>("query")
        .map(|words| words.cloned().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let page = args.get_one::<u32>("page").copied().unwrap_or(1);

    let result = with_spinner("Searching...", || client.search(&query, page))?
        .context("search failed")?;
    let stdout = io::stdout();
    let color = stdout.is_terminal();
    render_search(&result, page, color, &mut stdout.lock())?;
    Ok(())
}

fn cart(client: &mut ApiClient, args: &ArgMatches) -> Result<()> {
    let mut out = io::stdout().lock();
    match args.subcommand() {
        Some(("add", add)) => {
            let product_id = *add
                .get_one::<u64>("product_id")
                .context("missing product id")?;
            let quantity = add.get_one::<u32>("quantity").copied().unwrap_or(1);
            let items = [CartItem {
                product_id,
                quantity,
            }];

            let cart = with_spinner("Adding to cart...", || client.add_to_cart(&items))?
                .context("failed to add to cart")?;
            writeln!(out, "Added {quantity} item(s) to cart")?;
            writeln!(
                out,
                "Cart total: {} {} ({} items)",
                cart.display_price, cart.currency, cart.product_quantity_count
            )?;
        }
        Some(("clear", _)) => {
            with_spinner("Clearing cart...", || client.clear_cart())?
                .context("failed to clear cart")?;
            writeln!(out, "Cart cleared")?;
        }
        _ => {
            let cart = with_spinner("Fetching cart...", || client.get_cart())?
                .context("failed to get cart")?;
            render_cart(&cart, &mut out)?;
        }
    }
    Ok(())
}

/// Print product hits. Entries that are not products are skipped here, at
/// the rendering boundary. `color` adds ANSI colours to the availability
/// mark and should only be set when writing to a terminal.
pub fn render_search(
    result: &SearchResponse,
    page: u32,
    color: bool,
    out: &mut impl Write,
) -> io::Result<()> {
    let products: Vec<&Product> = result.products().collect();
    if products.is_empty() {
        return writeln!(out, "No products found");
    }

    writeln!(
        out,
        "Found {} products (page {}):\n",
        result.attributes.items, result.attributes.page
    )?;

    for product in products {
        let attr = &product.attributes;
        let available = attr.availability.is_available;
        let mark = if available { "✓" } else { "✗" };
        let mark = match (color, available) {
            (false, _) => mark.to_string(),
            (true, true) => mark.green().to_string(),
            (true, false) => mark.red().to_string(),
        };
        writeln!(out, "[{}] {} {}", product.id, mark, attr.name)?;
        if let Some(brand) = non_empty(&attr.brand) {
            writeln!(out, "     Brand: {brand}")?;
        }
        if let Some(extra) = non_empty(&attr.name_extra) {
            writeln!(out, "     {extra}")?;
        }
        write!(out, "     Price: {} {}", attr.gross_price, attr.currency)?;
        if let (Some(unit_price), Some(unit)) = (
            non_empty(&attr.gross_unit_price),
            non_empty(&attr.unit_price_quantity_abbr),
        ) {
            write!(out, " ({unit_price}/{unit})")?;
        }
        writeln!(out, "\n")?;
    }

    if result.attributes.has_more_items {
        writeln!(
            out,
            "More results available. Use --page {} to see next page.",
            page.saturating_add(1)
        )?;
    }
    Ok(())
}

/// Print the cart exactly as the server reported it.
pub fn render_cart(cart: &Cart, out: &mut impl Write) -> io::Result<()> {
    if cart.is_empty() {
        return writeln!(out, "Your cart is empty");
    }

    writeln!(
        out,
        "Cart: {} ({} items)\n",
        cart.label_text, cart.product_quantity_count
    )?;

    for item in cart.items() {
        writeln!(out, "[{}] {}", item.product.id, item.product.full_name)?;
        if let Some(extra) = non_empty(&item.product.name_extra) {
            writeln!(out, "     {extra}")?;
        }
        writeln!(
            out,
            "     Qty: {} × {} {} = {} {}\n",
            item.quantity, item.product.gross_price, cart.currency, item.display_price, cart.currency
        )?;
    }

    writeln!(out, "─────────────────────────────────")?;
    for line in cart.summary_lines.iter().flat_map(|group| group.lines.iter()) {
        writeln!(
            out,
            "{:<25} {} {}",
            line.description, line.gross_amount, cart.currency
        )?;
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CartGroup, CartGroupItem, CartProduct, SummaryGroup, SummaryLine};
    use serde_json::json;
    use tempfile::TempDir;

    fn rendered(render: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        render(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn cli_is_built_from_table() {
        let table = command_table();
        build_cli(&table).debug_assert();

        let names: Vec<_> = table.iter().map(|spec| spec.name).collect();
        assert_eq!(names, ["login", "logout", "search", "cart", "version"]);
        let authenticated: Vec<_> = table
            .iter()
            .filter(|spec| spec.requires_session())
            .map(|spec| spec.name)
            .collect();
        assert_eq!(authenticated, ["search", "cart"]);
    }

    #[test]
    fn search_args_parse() {
        let table = command_table();
        let matches = build_cli(&table)
            .try_get_matches_from(["mathemcli", "search", "oat", "milk", "-n", "3"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "search");
        let words: Vec<_> = args.get_many::<String>("query").unwrap().collect();
        assert_eq!(words, ["oat", "milk"]);
        assert_eq!(args.get_one::<u32>("page"), Some(&3));
    }

    #[test]
    fn cart_add_defaults_quantity_to_one() {
        let table = command_table();
        let matches = build_cli(&table)
            .try_get_matches_from(["mathemcli", "cart", "add", "42"])
            .unwrap();
        let (_, cart) = matches.subcommand().unwrap();
        let (sub, add) = cart.subcommand().unwrap();
        assert_eq!(sub, "add");
        assert_eq!(add.get_one::<u64>("product_id"), Some(&42));
        assert_eq!(add.get_one::<u32>("quantity"), Some(&1));
    }

    #[test]
    fn authenticated_command_without_session_is_not_logged_in() {
        let dir = TempDir::new().unwrap();
        let inv = Invocation {
            store: SessionStore::at(dir.path().join("session.json")),
            config: ClientConfig::default(),
        };
        let table = command_table();
        let matches = build_cli(&table)
            .try_get_matches_from(["mathemcli", "cart"])
            .unwrap();

        let err = dispatch(&table, &inv, &matches).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NotLoggedIn)
        ));
    }

    #[test]
    fn empty_session_id_counts_as_logged_out() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::at(dir.path().join("session.json"));
        store
            .save(&Session {
                session_id: String::new(),
                csrf_token: "C1".into(),
                email: "a@b.com".into(),
            })
            .unwrap();

        let err = load_session(&store).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NotLoggedIn)
        ));
    }

    #[test]
    fn logout_without_session_succeeds() {
        let dir = TempDir::new().unwrap();
        let inv = Invocation {
            store: SessionStore::at(dir.path().join("session.json")),
            config: ClientConfig::default(),
        };
        let table = command_table();
        let matches = build_cli(&table)
            .try_get_matches_from(["mathemcli", "logout"])
            .unwrap();
        dispatch(&table, &inv, &matches).unwrap();
    }

    #[test]
    fn search_rendering_skips_non_products() {
        let result: SearchResponse = serde_json::from_value(json!({
            "type": "mixed",
            "attributes": { "items": 12, "page": 2, "has_more_items": true },
            "items": [
                { "id": "r1", "type": "recipe", "attributes": { "name": "Pannkakor" } },
                {
                    "id": 42,
                    "type": "product",
                    "attributes": {
                        "name": "Mjölk",
                        "brand": "Arla",
                        "name_extra": "1 l",
                        "gross_price": "15.95",
                        "gross_unit_price": "15.95",
                        "unit_price_quantity_abbreviation": "l",
                        "currency": "SEK",
                        "availability": { "is_available": false }
                    }
                }
            ]
        }))
        .unwrap();

        let text = rendered(|out| render_search(&result, 2, false, out));
        assert!(text.contains("Found 12 products (page 2):"));
        assert!(text.contains("[42] ✗ Mjölk\n"));
        assert!(!text.contains('\u{1b}'), "plain output has no escapes");
        assert!(text.contains("Brand: Arla"));
        assert!(text.contains("Price: 15.95 SEK (15.95/l)"));
        assert!(text.contains("Use --page 3"));
        assert!(!text.contains("Pannkakor"));
    }

    #[test]
    fn search_without_products_says_so() {
        let result = SearchResponse::default();
        let text = rendered(|out| render_search(&result, 1, false, out));
        assert_eq!(text, "No products found\n");
    }

    #[test]
    fn colored_search_marks_availability() {
        let result: SearchResponse = serde_json::from_value(json!({
            "items": [{
                "id": 1,
                "type": "product",
                "attributes": { "name": "Bröd", "availability": { "is_available": true } }
            }]
        }))
        .unwrap();
        let text = rendered(|out| render_search(&result, 1, true, out));
        assert!(text.contains('✓'));
        assert!(text.contains("Bröd"));
    }

    #[test]
    fn next_page_hint_saturates_on_last_page() {
        let result: SearchResponse = serde_json::from_value(json!({
            "attributes": { "items": 1, "page": u32::MAX, "has_more_items": true },
            "items": [{ "id": 1, "type": "product", "attributes": { "name": "Bröd" } }]
        }))
        .unwrap();
        let text = rendered(|out| render_search(&result, u32::MAX, false, out));
        assert!(text.contains(&format!("Use --page {}", u32::MAX)));
    }

    #[test]
    fn cart_rendering_uses_server_totals() {
        let cart = Cart {
            label_text: "1 vara".into(),
            product_quantity_count: 2,
            currency: "SEK".into(),
            groups: vec![CartGroup {
                items: vec![CartGroupItem {
                    product: CartProduct {
                        id: 42,
                        full_name: "Mellanmjölk 1,5%".into(),
                        gross_price: "15.95".into(),
                        ..Default::default()
                    },
                    item_id: 7,
                    quantity: 2,
                    display_price: "31.90".into(),
                }],
            }],
            summary_lines: vec![SummaryGroup {
                id: "totals".into(),
                lines: vec![SummaryLine {
                    description: "Att betala".into(),
                    gross_amount: "80.90".into(),
                    name: "total".into(),
                }],
            }],
            ..Default::default()
        };

        let text = rendered(|out| render_cart(&cart, out));
        assert!(text.starts_with("Cart: 1 vara (2 items)"));
        assert!(text.contains("[42] Mellanmjölk 1,5%"));
        assert!(text.contains("Qty: 2 × 15.95 SEK = 31.90 SEK"));
        assert!(text.contains("Att betala"));
        assert!(text.contains("80.90 SEK"));
    }

    #[test]
    fn empty_cart_rendering() {
        let text = rendered(|out| render_cart(&Cart::default(), out));
        assert_eq!(text, "Your cart is empty\n");
    }
}
