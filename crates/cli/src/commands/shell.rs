//! Interactive storefront shell.
//!
//! A line-oriented stand-in for the storefront front end: every command maps
//! onto one `depot-client` call, and cart edits go through [`CartSync`] so
//! quantity changes are debounced and reconciled exactly as they would be
//! in a browser.
//!
//! # Usage
//!
//! ```text
//! depot> locations
//! depot> location WH-01
//! depot> products bolt
//! depot> add P-100 12
//! depot> qty P-100-line 20
//! depot> cart
//! ```

use std::fmt::Write as _;
use std::io::Write as _;

use depot_client::store::StoreError;
use depot_client::{
    ApiClient, CartError, CartSync, CartView, ClientConfig, ClientError, GuestCart, LineStatus,
    LocalStore, LocationContext, Suggestions,
};
use depot_core::{
    CreateOrder, Email, LineId, LocationId, NewCartLine, ProductId, ProductQuery,
};
use secrecy::SecretString;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, warn};
use url::Url;

const HELP: &str = "\
Commands:
  login <email>             sign in (password is read from the next line)
  logout                    sign out
  me                        show the signed-in customer
  locations                 list warehouses
  location [<id>]           select a warehouse (no id clears the selection)
  products [<search>]       list products
  product <id>              show a product
  suggest <text>            search suggestions
  cart                      show the cart
  add <product> [<qty>]     add a product (default quantity 1)
  qty <line> <qty>          change a line quantity (0 removes)
  rm <line>                 remove a line
  checkout                  show checkout options
  order <address> [<po>]    place the order
  orders [<page>]           order history
  help                      this text
  quit                      leave the shell";

/// Errors from the shell itself (client errors are printed, not returned).
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Terminal error: {0}")]
    Io(#[from] std::io::Error),
}

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Login(Email),
    Logout,
    Me,
    Locations,
    Location(Option<LocationId>),
    Products(Option<String>),
    Product(ProductId),
    Suggest(String),
    Cart,
    Add { product: ProductId, quantity: u32 },
    Quantity { line: LineId, quantity: u32 },
    Remove(LineId),
    Checkout,
    Order { address: String, po_number: Option<String> },
    Orders(u32),
}

/// Parse one input line. Blank lines yield `None`.
///
/// # Errors
///
/// Returns a usage message for unknown commands or bad arguments.
pub fn parse(input: &str) -> Result<Option<Command>, String> {
    let mut words = input.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (name, args.as_slice()) {
        ("help" | "?", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        ("login", [email]) => {
            Command::Login(Email::parse(email).map_err(|e| format!("Invalid email: {e}"))?)
        }
        ("logout", []) => Command::Logout,
        ("me", []) => Command::Me,
        ("locations", []) => Command::Locations,
        ("location", []) => Command::Location(None),
        ("location", [id]) => Command::Location(Some(LocationId::from(*id))),
        ("products", []) => Command::Products(None),
        ("products", words) => Command::Products(Some(words.join(" "))),
        ("product", [id]) => Command::Product(ProductId::from(*id)),
        ("suggest", words) if !words.is_empty() => Command::Suggest(words.join(" ")),
        ("cart", []) => Command::Cart,
        ("add", [product]) => Command::Add {
            product: ProductId::from(*product),
            quantity: 1,
        },
        ("add", [product, quantity]) => Command::Add {
            product: ProductId::from(*product),
            quantity: parse_quantity(quantity)?,
        },
        ("qty", [line, quantity]) => Command::Quantity {
            line: LineId::from(*line),
            quantity: parse_quantity(quantity)?,
        },
        ("rm", [line]) => Command::Remove(LineId::from(*line)),
        ("checkout", []) => Command::Checkout,
        ("order", [address]) => Command::Order {
            address: (*address).to_string(),
            po_number: None,
        },
        ("order", [address, po]) => Command::Order {
            address: (*address).to_string(),
            po_number: Some((*po).to_string()),
        },
        ("orders", []) => Command::Orders(1),
        ("orders", [page]) => Command::Orders(
            page.parse()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| format!("Invalid page: {page}"))?,
        ),
        _ => return Err(format!("Unknown command or arguments: {input}\nType `help` for a list")),
    };

    Ok(Some(command))
}

fn parse_quantity(raw: &str) -> Result<u32, String> {
    raw.parse().map_err(|_| format!("Invalid quantity: {raw}"))
}

/// Render the cart view as a table.
#[must_use]
pub fn render_cart(view: &CartView) -> String {
    if view.lines.is_empty() {
        return "Cart is empty".to_string();
    }

    let mut out = String::new();
    for entry in &view.lines {
        let line = &entry.line;
        let status = match entry.status {
            LineStatus::Idle => "",
            LineStatus::PendingEdit => " (pending)",
            LineStatus::Updating => " (updating)",
        };
        let _ = write!(
            out,
            "{:<16} {:<28} x{:<6} {:>12}{status}",
            line.id, line.name, line.quantity, line.line_total
        );
        if let Some(error) = entry.error {
            let _ = write!(out, "  ! {error}");
        }
        out.push('\n');
    }
    let _ = write!(out, "{} items, subtotal {}", view.item_count, view.subtotal);
    out
}

// =============================================================================
// Session
// =============================================================================

struct Shell {
    api: ApiClient,
    cart: CartSync<ApiClient>,
    suggestions: Suggestions<ApiClient>,
    input: Lines<BufReader<Stdin>>,
}

/// Run the shell until `quit` or end of input.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the terminal fails.
pub async fn run(api_url: Option<&str>) -> Result<(), ShellError> {
    let mut config = ClientConfig::from_env().map_err(|e| ShellError::Config(e.to_string()))?;
    if let Some(raw) = api_url {
        config.base_url = Url::parse(raw).map_err(|e| ShellError::Config(e.to_string()))?;
    }

    let store = config
        .state_dir
        .as_ref()
        .map_or_else(LocalStore::memory, LocalStore::in_dir);
    let api = ApiClient::new(&config, LocationContext::new(store.clone()))?;
    let cart = CartSync::new(api.clone(), GuestCart::load(store), config.cart_debounce);
    let _session_task = cart.follow_session(api.session_events());
    cart.load().await?;

    let mut shell = Shell {
        suggestions: Suggestions::new(api.clone()),
        api,
        cart,
        input: BufReader::new(tokio::io::stdin()).lines(),
    };

    say(&format!("Connected to {}. Type `help` for commands.", config.base_url))?;
    loop {
        prompt()?;
        let Some(line) = shell.input.next_line().await? else {
            break;
        };
        match parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => {
                if let Err(e) = shell.execute(command).await {
                    say(&format!("Error: {e}"))?;
                }
            }
            Err(usage) => say(&usage)?,
        }
    }

    shell.cart.flush().await;
    shell.cart.settled().await;
    Ok(())
}

impl Shell {
    async fn execute(&mut self, command: Command) -> Result<(), ShellError> {
        debug!(?command, "Executing");
        match command {
            Command::Help => say(HELP)?,
            Command::Quit => {}
            Command::Login(email) => {
                say("Password:")?;
                let password = self.input.next_line().await?.unwrap_or_default();
                let customer = self
                    .api
                    .login(&email, &SecretString::from(password))
                    .await?;
                say(&format!("Signed in as {} ({})", customer.name, customer.email))?;
            }
            Command::Logout => {
                self.api.logout().await?;
                say("Signed out")?;
            }
            Command::Me => {
                let me = self.api.me().await?;
                say(&format!(
                    "{} <{}>{}",
                    me.name,
                    me.email,
                    me.company.map(|c| format!(", {c}")).unwrap_or_default()
                ))?;
            }
            Command::Locations => {
                let current = self.api.location().current();
                for location in self.api.locations().await? {
                    let marker = if current.as_ref() == Some(&location.id) { "*" } else { " " };
                    say(&format!("{marker} {:<10} {}", location.id, location.name))?;
                }
            }
            Command::Location(id) => {
                let changed = self.api.location().select(id.clone())?;
                if changed {
                    // Prices and stock follow the location
                    if let Err(e) = self.cart.load().await {
                        warn!(error = %e, "Cart reload after location change failed");
                    }
                }
                say(&id.map_or_else(
                    || "Showing all locations".to_string(),
                    |id| format!("Location set to {id}"),
                ))?;
            }
            Command::Products(search) => {
                let page = self
                    .api
                    .products(&ProductQuery {
                        search,
                        ..ProductQuery::default()
                    })
                    .await?;
                for product in &page.items {
                    say(&format!(
                        "{:<12} {:<32} {:>12}  {} available",
                        product.id, product.name, product.price, product.available
                    ))?;
                }
                say(&format!("Page {} ({} products)", page.page, page.total))?;
            }
            Command::Product(id) => {
                let product = self.api.product(&id).await?;
                say(&format!("{} {}\n{}", product.name, product.price, product.description))?;
                for stock in &product.stock {
                    say(&format!("  {:<10} {}", stock.location_id, stock.available))?;
                }
            }
            Command::Suggest(text) => {
                let mut updates = self.suggestions.subscribe();
                self.suggestions.query(&text);
                while updates.borrow_and_update().loading {
                    if updates.changed().await.is_err() {
                        break;
                    }
                }
                for suggestion in self.suggestions.current().results {
                    say(&format!("{:<12} {}", suggestion.product_id, suggestion.name))?;
                }
            }
            Command::Cart => say(&render_cart(&self.cart.view()))?,
            Command::Add { product, quantity } => {
                let product = self.api.product(&product).await?;
                let id = self
                    .cart
                    .add(NewCartLine {
                        product_id: product.id,
                        variation_id: None,
                        quantity,
                        name: product.name,
                        sku: product.sku,
                        unit_price: Some(product.price),
                        image: product.images.into_iter().next(),
                    })
                    .await?;
                say(&format!("Added as line {id}"))?;
            }
            Command::Quantity { line, quantity } => {
                self.cart
                    .set_quantity(&line, quantity)
                    .await?;
                self.cart.settled().await;
                say(&render_cart(&self.cart.view()))?;
            }
            Command::Remove(line) => {
                self.cart
                    .remove(&line)
                    .await?;
                self.cart.settled().await;
                say(&render_cart(&self.cart.view()))?;
            }
            Command::Checkout => {
                let bootstrap = self.api.checkout_bootstrap().await?;
                say(&format!(
                    "{} items, subtotal {}",
                    bootstrap.cart.item_count, bootstrap.cart.subtotal
                ))?;
                for address in &bootstrap.addresses {
                    say(&format!(
                        "  address {:<8} {}, {} {}",
                        address.id, address.line1, address.city, address.postal_code
                    ))?;
                }
                for method in &bootstrap.shipping_methods {
                    say(&format!("  ship    {:<8} {} {}", method.code, method.label, method.cost))?;
                }
                if let Some(terms) = bootstrap.payment_terms {
                    say(&format!("  terms   {terms}"))?;
                }
            }
            Command::Order { address, po_number } => {
                self.cart.flush().await;
                self.cart.settled().await;
                let confirmation = self
                    .api
                    .create_order(&CreateOrder {
                        shipping_address_id: address.into(),
                        billing_address_id: None,
                        shipping_method: None,
                        po_number,
                        notes: None,
                    })
                    .await?;
                say(&format!("Order {} placed", confirmation.order_number))?;
                if let Err(e) = self.cart.load().await {
                    warn!(error = %e, "Cart reload after order failed");
                }
            }
            Command::Orders(page) => {
                let orders = self.api.orders(page).await?;
                for order in &orders.items {
                    say(&format!(
                        "{:<12} {:<12?} {} {:>12}",
                        order.number,
                        order.status,
                        order.placed_at.format("%Y-%m-%d"),
                        order.total
                    ))?;
                }
                say(&format!("Page {} of {} orders", orders.page, orders.total))?;
            }
        }
        Ok(())
    }
}

fn say(text: &str) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{text}")
}

fn prompt() -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    write!(out, "depot> ")?;
    out.flush()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use depot_client::cart::LineView;
    use depot_client::{CartMode, LineError};
    use depot_core::{CartLine, CurrencyCode, Money};
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(parse("cart").unwrap(), Some(Command::Cart));
        assert_eq!(
            parse("add P-100").unwrap(),
            Some(Command::Add {
                product: ProductId::from("P-100"),
                quantity: 1
            })
        );
        assert_eq!(
            parse("qty L1 0").unwrap(),
            Some(Command::Quantity {
                line: LineId::from("L1"),
                quantity: 0
            })
        );
        assert_eq!(parse("location").unwrap(), Some(Command::Location(None)));
        assert_eq!(
            parse("products hex bolt").unwrap(),
            Some(Command::Products(Some("hex bolt".to_string())))
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse("qty L1 many").is_err());
        assert!(parse("login not-an-email").is_err());
        assert!(parse("orders 0").is_err());
        assert!(parse("frobnicate").is_err());
    }

    #[test]
    fn test_render_cart_shows_status_and_errors() {
        let price = Money::new(Decimal::new(50, 2), CurrencyCode::USD);
        let line = CartLine {
            id: LineId::from("L1"),
            product_id: ProductId::from("P-100"),
            variation_id: None,
            sku: None,
            name: "Hex bolt".to_string(),
            quantity: 4,
            unit_price: price,
            line_total: price.times(4),
            image: None,
        };
        let view = CartView {
            mode: CartMode::Authenticated,
            lines: vec![LineView {
                line,
                status: LineStatus::Idle,
                error: Some(LineError::OnlyAvailable(4)),
            }],
            subtotal: price.times(4),
            item_count: 4,
            syncing: false,
        };

        let out = render_cart(&view);
        assert!(out.contains("Hex bolt"));
        assert!(out.contains("Only 4 available"));
        assert!(out.ends_with("4 items, subtotal $2.00"));
    }
}
