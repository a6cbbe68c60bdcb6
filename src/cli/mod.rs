mod output;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{
    ChargeRequest, EntryRequest, PaymentRequest, SaleRequest, SaleTender, ServiceRequest,
    SettlementService, TransactionEdit, TransferRequest,
};
use crate::domain::{
    Account, AccountType, Cents, Counterparty, CounterpartyKind, Product, SaleLine, TxKind,
    parse_cents,
};
use crate::storage::TransactionFilter;

use output::Output;

/// Shopledger - ledger and settlement engine for a small shop
#[derive(Parser)]
#[command(name = "shopledger")]
#[command(about = "Accounts, sales, service tickets and counter-party balances for a retail/service shop")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "SHOPLEDGER_DB", default_value = "shopledger.db")]
    pub database: String,

    /// Enable verbose output (debug logging unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Customer, supplier and wholesaler commands
    #[command(subcommand)]
    Party(PartyCommands),

    /// Product catalog commands
    #[command(subcommand)]
    Product(ProductCommands),

    /// Expense category commands
    #[command(subcommand)]
    Category(CategoryCommands),

    /// Record money coming into an account
    Income {
        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Account name
        #[arg(short, long)]
        account: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Date (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// Record money leaving an account
    Expense {
        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Account name
        #[arg(short, long)]
        account: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Expense category name
        #[arg(short, long)]
        category: Option<String>,

        /// Date (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,

        /// Allow a credit card to go past its limit
        #[arg(long)]
        override_limit: bool,
    },

    /// Move money between two accounts
    Transfer {
        amount: String,

        /// Source account name
        #[arg(long)]
        from: String,

        /// Target account name
        #[arg(long)]
        to: String,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        date: Option<String>,

        /// Allow a credit card to go past its limit
        #[arg(long)]
        override_limit: bool,
    },

    /// Pay down a credit card
    PayCard {
        amount: String,

        /// Account the money comes from
        #[arg(long)]
        from: String,

        /// Credit card account name
        #[arg(long)]
        card: String,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        date: Option<String>,
    },

    /// Settle a counter sale
    Sale {
        /// Line as PRODUCT:QTY:PRICE[:DESCRIPTION]; use "-" as PRODUCT for a
        /// free-form line. Repeatable.
        #[arg(short, long = "line", required = true)]
        lines: Vec<String>,

        /// Discount on the whole sale
        #[arg(long)]
        discount: Option<String>,

        /// Account receiving the money
        #[arg(short, long, conflicts_with_all = ["default", "customer"])]
        account: Option<String>,

        /// Use the default account of this type (cash, bank, pos, other)
        #[arg(long, conflicts_with = "customer")]
        default: Option<String>,

        /// Charge the sale to a customer's balance
        #[arg(long)]
        customer: Option<String>,

        /// Exchange rate into the customer's secondary currency
        #[arg(long, requires = "customer")]
        rate: Option<f64>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        date: Option<String>,
    },

    /// Close a service ticket and charge the customer
    Service {
        /// Customer name
        #[arg(long)]
        customer: String,

        /// Service ticket id (a new one is generated if omitted)
        #[arg(long)]
        ticket: Option<String>,

        /// Part as PRODUCT:QTY:PRICE[:DESCRIPTION]. Repeatable.
        #[arg(short, long = "part")]
        parts: Vec<String>,

        /// Labor cost
        #[arg(long)]
        labor: Option<String>,

        /// Exchange rate into the customer's secondary currency
        #[arg(long)]
        rate: Option<f64>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        date: Option<String>,
    },

    /// Record a payment from a customer or to a supplier
    Payment {
        amount: String,

        /// Counter-party name
        #[arg(long)]
        party: String,

        /// Account the money moves through
        #[arg(short, long)]
        account: String,

        /// Service ticket the payment is for
        #[arg(long)]
        ticket: Option<String>,

        /// Exchange rate into the counter-party's secondary currency
        #[arg(long)]
        rate: Option<f64>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        date: Option<String>,

        /// Allow a credit card to go past its limit
        #[arg(long)]
        override_limit: bool,
    },

    /// Book a debt with a counter-party without moving money
    Charge {
        amount: String,

        /// Counter-party name
        #[arg(long)]
        party: String,

        #[arg(long)]
        rate: Option<f64>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        date: Option<String>,
    },

    /// Edit a transaction's amount, account or description
    Edit {
        /// Transaction ID
        id: String,

        /// New amount (direction is kept)
        #[arg(long)]
        amount: Option<String>,

        /// Move the transaction to another account
        #[arg(short, long)]
        account: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        override_limit: bool,
    },

    /// Delete a manual income or expense
    Delete {
        /// Transaction ID
        id: String,
    },

    /// Void a transfer (either leg's ID)
    VoidTransfer {
        id: String,
    },

    /// Void a sale and everything it moved
    VoidSale {
        /// Sale ID
        id: String,
    },

    /// List ledger transactions
    Transactions {
        /// Filter by account name
        #[arg(short, long)]
        account: Option<String>,

        /// Filter by kind (repeatable)
        #[arg(short, long = "kind")]
        kinds: Vec<String>,

        /// Filter from date (YYYY-MM-DD)
        #[arg(long)]
        from_date: Option<String>,

        /// Filter to date (YYYY-MM-DD)
        #[arg(long)]
        to_date: Option<String>,

        /// Maximum number of transactions to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Verify balances against the ledgers
    Check,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a new account
    Create {
        /// Account name (must be unique)
        name: String,

        /// Account type: cash, bank, pos, credit_card, other
        #[arg(short = 't', long = "type")]
        account_type: String,

        /// Currency code (e.g., EUR, USD)
        #[arg(short, long, default_value = "EUR")]
        currency: String,

        /// Opening balance (outstanding debt for credit cards)
        #[arg(long)]
        initial: Option<String>,

        /// Credit limit (credit cards only)
        #[arg(long)]
        limit: Option<String>,

        /// Make this the default account of its type
        #[arg(long)]
        default: bool,
    },

    /// List all accounts
    List,

    /// Show account details
    Show {
        name: String,
    },
}

#[derive(Subcommand)]
pub enum PartyCommands {
    /// Create a customer, supplier or wholesaler
    Create {
        name: String,

        /// customer, supplier or wholesaler
        #[arg(short, long)]
        kind: String,

        /// Secondary currency tracked alongside the balance
        #[arg(long)]
        secondary_currency: Option<String>,
    },

    /// List all counter-parties
    List,

    /// Show a counter-party and its history
    Show {
        name: String,
    },
}

#[derive(Subcommand)]
pub enum ProductCommands {
    /// Add a product to the catalog
    Create {
        name: String,

        /// Quantity on hand
        #[arg(short, long, default_value = "0")]
        quantity: i64,

        /// Do not track stock for this product
        #[arg(long, conflicts_with = "quantity")]
        untracked: bool,
    },
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// Create an expense category
    Create { name: String },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let out = Output::new(self.json);

        if matches!(self.command, Commands::Init) {
            SettlementService::init(&self.database).await?;
            println!("Database initialized: {}", self.database);
            return Ok(());
        }

        let service = SettlementService::connect(&self.database).await?;

        match self.command {
            Commands::Init => {}

            Commands::Account(cmd) => run_account_command(&service, &out, cmd).await?,
            Commands::Party(cmd) => run_party_command(&service, &out, cmd).await?,

            Commands::Product(ProductCommands::Create {
                name,
                quantity,
                untracked,
            }) => {
                let product = if untracked {
                    Product::untracked(name)
                } else {
                    Product::new(name, quantity)
                };
                let product = service.create_product(product).await?;
                out.emit(&product, || {
                    println!("Created product: {} ({})", product.name, product.id)
                })?;
            }

            Commands::Category(CategoryCommands::Create { name }) => {
                let category = service.create_category(name).await?;
                out.emit(&category, || {
                    println!("Created expense category: {}", category.name)
                })?;
            }

            Commands::Income {
                amount,
                account,
                description,
                date,
            } => {
                let account = service.find_account(&account).await?;
                let mut request =
                    EntryRequest::new(account.id, parse_amount(&amount)?, parse_date_or_now(date)?);
                request.description = description;

                let result = service.record_income(request).await?;
                out.entry("Recorded income", &result)?;
            }

            Commands::Expense {
                amount,
                account,
                description,
                category,
                date,
                override_limit,
            } => {
                let account = service.find_account(&account).await?;
                let mut request =
                    EntryRequest::new(account.id, parse_amount(&amount)?, parse_date_or_now(date)?);
                request.description = description;
                request.override_limit = override_limit;
                if let Some(name) = category {
                    request.category_id = Some(service.expense_category_by_name(&name).await?.id);
                }

                let result = service.record_expense(request).await?;
                out.entry("Recorded expense", &result)?;
            }

            Commands::Transfer {
                amount,
                from,
                to,
                description,
                date,
                override_limit,
            } => {
                let from = service.find_account(&from).await?;
                let to = service.find_account(&to).await?;
                let mut request = TransferRequest::new(
                    from.id,
                    to.id,
                    parse_amount(&amount)?,
                    parse_date_or_now(date)?,
                );
                request.description = description;
                request.override_limit = override_limit;

                let result = service.transfer(request).await?;
                out.transfer("Recorded transfer", &result)?;
            }

            Commands::PayCard {
                amount,
                from,
                card,
                description,
                date,
            } => {
                let from = service.find_account(&from).await?;
                let card = service.find_account(&card).await?;
                let mut request = TransferRequest::new(
                    from.id,
                    card.id,
                    parse_amount(&amount)?,
                    parse_date_or_now(date)?,
                );
                request.description = description;

                let result = service.pay_credit_card(request).await?;
                out.transfer("Paid credit card", &result)?;
            }

            Commands::Sale {
                lines,
                discount,
                account,
                default,
                customer,
                rate,
                description,
                date,
            } => {
                let tender = match (account, default, customer) {
                    (Some(name), _, _) => SaleTender::Account(service.find_account(&name).await?.id),
                    (_, Some(kind), _) => SaleTender::DefaultOf(parse_account_type(&kind)?),
                    (_, _, Some(name)) => {
                        SaleTender::OnCredit(service.find_counterparty(&name).await?.id)
                    }
                    (None, None, None) => SaleTender::DefaultOf(AccountType::Cash),
                };

                let request = SaleRequest {
                    date: parse_date_or_now(date)?,
                    lines: parse_lines(&service, &lines).await?,
                    discount: discount.map(|d| parse_amount(&d)).transpose()?.unwrap_or(0),
                    tender,
                    description,
                    exchange_rate: rate,
                };

                let result = service.settle_sale(request).await?;
                out.sale(&result)?;
            }

            Commands::Service {
                customer,
                ticket,
                parts,
                labor,
                rate,
                description,
                date,
            } => {
                let customer = service.find_counterparty(&customer).await?;
                let service_id = match ticket {
                    Some(id) => parse_id(&id, "service ticket")?,
                    None => Uuid::new_v4(),
                };

                let request = ServiceRequest {
                    service_id,
                    customer_id: customer.id,
                    parts: parse_lines(&service, &parts).await?,
                    labor: labor.map(|l| parse_amount(&l)).transpose()?.unwrap_or(0),
                    date: parse_date_or_now(date)?,
                    description,
                    exchange_rate: rate,
                };

                let result = service.settle_service(request).await?;
                out.service(service_id, &result)?;
            }

            Commands::Payment {
                amount,
                party,
                account,
                ticket,
                rate,
                description,
                date,
                override_limit,
            } => {
                let party = service.find_counterparty(&party).await?;
                let account = service.find_account(&account).await?;
                let mut request = PaymentRequest::new(
                    party.id,
                    account.id,
                    parse_amount(&amount)?,
                    parse_date_or_now(date)?,
                );
                request.description = description;
                request.exchange_rate = rate;
                request.override_limit = override_limit;
                if let Some(id) = ticket {
                    request = request.for_service(parse_id(&id, "service ticket")?);
                }

                let result = service.record_payment(request).await?;
                out.payment(&result)?;
            }

            Commands::Charge {
                amount,
                party,
                rate,
                description,
                date,
            } => {
                let party = service.find_counterparty(&party).await?;
                let request = ChargeRequest {
                    counterparty_id: party.id,
                    amount: parse_amount(&amount)?,
                    date: parse_date_or_now(date)?,
                    description,
                    exchange_rate: rate,
                };

                let result = service.charge_counterparty(request).await?;
                out.charge(&result)?;
            }

            Commands::Edit {
                id,
                amount,
                account,
                description,
                override_limit,
            } => {
                let id = parse_id(&id, "transaction")?;
                let account_id = match account {
                    Some(name) => Some(service.find_account(&name).await?.id),
                    None => None,
                };
                let edit = TransactionEdit {
                    amount: amount.map(|a| parse_amount(&a)).transpose()?,
                    account_id,
                    description,
                    override_limit,
                };

                let result = service.edit_transaction(id, edit).await?;
                out.edit(&result)?;
            }

            Commands::Delete { id } => {
                let id = parse_id(&id, "transaction")?;
                let result = service.delete_transaction(id).await?;
                out.delete(&result)?;
            }

            Commands::VoidTransfer { id } => {
                let id = parse_id(&id, "transaction")?;
                let result = service.void_transfer(id).await?;
                out.void_transfer(&result)?;
            }

            Commands::VoidSale { id } => {
                let id = parse_id(&id, "sale")?;
                let result = service.void_sale(id).await?;
                out.void_sale(&result)?;
            }

            Commands::Transactions {
                account,
                kinds,
                from_date,
                to_date,
                limit,
            } => {
                let mut filter = TransactionFilter::default();
                if let Some(name) = account {
                    filter.account_id = Some(service.find_account(&name).await?.id);
                }
                filter.kinds = kinds
                    .iter()
                    .map(|k| {
                        TxKind::from_str(k)
                            .ok_or_else(|| anyhow::anyhow!("Unknown transaction kind '{}'", k))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let from = from_date
                    .map(|s| parse_date(&s))
                    .transpose()
                    .context("Invalid from-date")?;
                let to = to_date
                    .map(|s| parse_date(&s))
                    .transpose()
                    .context("Invalid to-date")?;
                let filter = filter.between(from, to);

                // Pull pages only until the limit is reached.
                let mut cursor = service.query_transactions(filter);
                let mut transactions = Vec::new();
                while let Some(page) = cursor.next_page().await? {
                    transactions.extend(page);
                    if limit.is_some_and(|l| transactions.len() >= l) {
                        break;
                    }
                }
                if let Some(limit) = limit {
                    transactions.truncate(limit);
                }

                let accounts = service.list_accounts().await?;
                out.transactions(&transactions, &accounts)?;
            }

            Commands::Check => {
                let report = service.check_integrity().await?;
                out.integrity(&report)?;
                if !report.is_healthy() {
                    anyhow::bail!("Ledger integrity check failed");
                }
            }
        }

        Ok(())
    }
}

async fn run_account_command(
    service: &SettlementService,
    out: &Output,
    cmd: AccountCommands,
) -> Result<()> {
    match cmd {
        AccountCommands::Create {
            name,
            account_type,
            currency,
            initial,
            limit,
            default,
        } => {
            let account_type = parse_account_type(&account_type)?;
            let mut account = Account::new(name, account_type, currency);
            if let Some(initial) = initial {
                account = account.with_initial_balance(parse_amount_signed(&initial)?);
            }
            if let Some(limit) = limit {
                account = account.with_credit_limit(parse_amount(&limit)?);
            }
            if default {
                account = account.as_default();
            }

            let account = service.create_account(account).await?;
            out.emit(&account, || {
                println!(
                    "Created account: {} ({}{})",
                    account.name,
                    account.account_type,
                    if account.is_default { ", default" } else { "" }
                )
            })?;
        }

        AccountCommands::List => {
            let accounts = service.list_accounts().await?;
            out.accounts(&accounts)?;
        }

        AccountCommands::Show { name } => {
            let account = service.find_account(&name).await?;
            let recent = service
                .query_transactions(TransactionFilter::for_account(account.id))
                .collect_all()
                .await?;
            out.account_detail(&account, &recent)?;
        }
    }
    Ok(())
}

async fn run_party_command(
    service: &SettlementService,
    out: &Output,
    cmd: PartyCommands,
) -> Result<()> {
    match cmd {
        PartyCommands::Create {
            name,
            kind,
            secondary_currency,
        } => {
            let kind = CounterpartyKind::from_str(&kind).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid counter-party kind '{}'. Valid kinds: customer, supplier, wholesaler",
                    kind
                )
            })?;
            let mut party = Counterparty::new(name, kind);
            if let Some(currency) = secondary_currency {
                party = party.with_secondary_currency(currency);
            }

            let party = service.create_counterparty(party).await?;
            out.emit(&party, || {
                println!("Created {}: {} ({})", party.kind, party.name, party.id)
            })?;
        }

        PartyCommands::List => {
            let parties = service.list_counterparties().await?;
            out.counterparties(&parties)?;
        }

        PartyCommands::Show { name } => {
            let party = service.find_counterparty(&name).await?;
            let history = service.counterparty_transactions(party.id).await?;
            out.counterparty_detail(&party, &history)?;
        }
    }
    Ok(())
}

fn parse_account_type(value: &str) -> Result<AccountType> {
    AccountType::from_str(value).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid account type '{}'. Valid types: cash, bank, pos, credit_card, other",
            value
        )
    })
}

fn parse_amount(value: &str) -> Result<Cents> {
    let cents = parse_amount_signed(value)?;
    if cents <= 0 {
        anyhow::bail!("Amount must be positive");
    }
    Ok(cents)
}

fn parse_amount_signed(value: &str) -> Result<Cents> {
    parse_cents(value).with_context(|| format!("Invalid amount '{}'. Use '50.00' or '50'", value))
}

fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid {} ID '{}'", what, value))
}

fn parse_date_or_now(date: Option<String>) -> Result<DateTime<Utc>> {
    match date {
        Some(date_str) => parse_date(&date_str)
            .with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str)),
        None => Ok(Utc::now()),
    }
}

fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    use chrono::NaiveDate;

    // Parse YYYY-MM-DD format
    let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .context("Date must be in YYYY-MM-DD format")?;

    // Convert to UTC datetime at midnight
    let naive_datetime = naive_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;

    Ok(DateTime::from_naive_utc_and_offset(naive_datetime, Utc))
}

/// A sale line as typed on the command line, before product names are looked up.
#[derive(Debug, PartialEq)]
struct LineSpec {
    product: Option<Uuid>,
    quantity: i64,
    unit_price: Cents,
    description: Option<String>,
}

/// Parse `PRODUCT:QTY:PRICE[:DESCRIPTION]`; `-` as PRODUCT means no product.
fn parse_line_spec(spec: &str) -> Result<LineSpec> {
    let mut parts = spec.splitn(4, ':');
    let (Some(product), Some(quantity), Some(price)) = (parts.next(), parts.next(), parts.next())
    else {
        anyhow::bail!(
            "Invalid line '{}'. Use PRODUCT:QTY:PRICE[:DESCRIPTION]",
            spec
        );
    };

    let product = match product.trim() {
        "-" | "" => None,
        id => Some(parse_id(id, "product")?),
    };
    let quantity: i64 = quantity
        .trim()
        .parse()
        .with_context(|| format!("Invalid quantity in line '{}'", spec))?;
    let unit_price = parse_amount_signed(price.trim())?;
    let description = parts
        .next()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    Ok(LineSpec {
        product,
        quantity,
        unit_price,
        description,
    })
}

async fn parse_lines(service: &SettlementService, specs: &[String]) -> Result<Vec<SaleLine>> {
    let mut lines = Vec::with_capacity(specs.len());
    for spec in specs {
        let spec = parse_line_spec(spec)?;
        let line = match spec.product {
            Some(product_id) => {
                let description = match spec.description {
                    Some(description) => description,
                    None => service.get_product(product_id).await?.name,
                };
                SaleLine::product(product_id, description, spec.quantity, spec.unit_price)
            }
            None => {
                let description = spec
                    .description
                    .ok_or_else(|| anyhow::anyhow!("A line without a product needs a description"))?;
                SaleLine::free(description, spec.quantity, spec.unit_price)
            }
        };
        lines.push(line);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_free_line() {
        let spec = parse_line_spec("-:2:12.50:Screen protector").unwrap();
        assert_eq!(
            spec,
            LineSpec {
                product: None,
                quantity: 2,
                unit_price: 1250,
                description: Some("Screen protector".into()),
            }
        );
    }

    #[test]
    fn test_parse_product_line_keeps_colons_in_description() {
        let id = Uuid::new_v4();
        let spec = parse_line_spec(&format!("{}:1:30:Cable 2m: braided", id)).unwrap();
        assert_eq!(spec.product, Some(id));
        assert_eq!(spec.description.as_deref(), Some("Cable 2m: braided"));
    }

    #[test]
    fn test_parse_line_rejects_missing_fields() {
        assert!(parse_line_spec("-:2").is_err());
        assert!(parse_line_spec("not-a-uuid:1:10").is_err());
        assert!(parse_line_spec("-:two:10").is_err());
    }

    #[test]
    fn test_parse_amount_must_be_positive() {
        assert_eq!(parse_amount("50").unwrap(), 5000);
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("-5").is_err());
        assert_eq!(parse_amount_signed("-5").unwrap(), -500);
    }

    #[test]
    fn test_parse_date() {
        let date = parse_date("2024-03-15").unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2024-03-15");
        assert!(parse_date("15/03/2024").is_err());
    }
}
