use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::application::{
    ChargeResult, DeleteResult, EditResult, EntryResult, PaymentResult, SaleResult,
    ServiceResult, TransferResult, VoidSaleResult, VoidTransferResult,
};
use crate::domain::{
    Account, AccountId, Counterparty, CounterpartyTransaction, IntegrityReport,
    LedgerTransaction, format_cents,
};

/// Renders command results either as tables or as JSON.
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print `value` as JSON, or run `human` for the plain-text rendering.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce()) -> Result<()> {
        if self.json {
            let text = serde_json::to_string_pretty(value).context("Failed to encode JSON")?;
            println!("{}", text);
        } else {
            human();
        }
        Ok(())
    }

    pub fn entry(&self, label: &str, result: &EntryResult) -> Result<()> {
        self.emit(result, || {
            println!(
                "{}: {} on {} ({})",
                label,
                format_cents(result.transaction.amount),
                result.account.name,
                result.transaction.id
            );
            print_balance(&result.account);
        })
    }

    pub fn transfer(&self, label: &str, result: &TransferResult) -> Result<()> {
        self.emit(result, || {
            println!(
                "{}: {} {} -> {} ({})",
                label,
                format_cents(result.out_leg.magnitude()),
                result.from_account.name,
                result.to_account.name,
                result.out_leg.id
            );
            print_balance(&result.from_account);
            print_balance(&result.to_account);
        })
    }

    pub fn sale(&self, result: &SaleResult) -> Result<()> {
        self.emit(result, || {
            println!(
                "Settled sale {}: {}",
                result.sale_id,
                format_cents(result.net_total)
            );
            if let Some(account) = &result.account {
                print_balance(account);
            }
            if let Some(customer) = &result.customer {
                print_party_balance(customer);
            }
        })
    }

    pub fn service(&self, ticket: Uuid, result: &ServiceResult) -> Result<()> {
        self.emit(result, || {
            println!("Settled service ticket {}", ticket);
            println!("  Sale:          {}", result.sale_id);
            println!("  Total cost:    {}", format_cents(result.total_cost));
            println!("  Paid before:   {}", format_cents(result.paid_before));
            println!("  Remaining due: {}", format_cents(result.remaining_due));
            print_party_balance(&result.customer);
        })
    }

    pub fn payment(&self, result: &PaymentResult) -> Result<()> {
        self.emit(result, || {
            println!(
                "Recorded {}: {} via {} ({})",
                result.transaction.kind,
                format_cents(result.transaction.magnitude()),
                result.account.name,
                result.transaction.id
            );
            print_balance(&result.account);
            print_party_balance(&result.counterparty);
        })
    }

    pub fn charge(&self, result: &ChargeResult) -> Result<()> {
        self.emit(result, || {
            println!(
                "Charged {} to {} ({})",
                format_cents(result.counterparty_tx.amount),
                result.counterparty.name,
                result.counterparty_tx.id
            );
            print_party_balance(&result.counterparty);
        })
    }

    pub fn edit(&self, result: &EditResult) -> Result<()> {
        self.emit(result, || {
            println!(
                "Updated transaction {}: {} \"{}\"",
                result.transaction.id,
                format_cents(result.transaction.amount),
                result.transaction.description
            );
            for account in &result.accounts {
                print_balance(account);
            }
        })
    }

    pub fn delete(&self, result: &DeleteResult) -> Result<()> {
        self.emit(result, || {
            println!(
                "Deleted transaction {} ({})",
                result.removed.id,
                format_cents(result.removed.amount)
            );
            print_balance(&result.account);
        })
    }

    pub fn void_transfer(&self, result: &VoidTransferResult) -> Result<()> {
        self.emit(result, || {
            println!("Voided transfer ({} legs removed)", result.removed.len());
            for account in &result.accounts {
                print_balance(account);
            }
        })
    }

    pub fn void_sale(&self, result: &VoidSaleResult) -> Result<()> {
        self.emit(result, || {
            println!(
                "Voided sale {}: {}",
                result.sale.id,
                format_cents(result.sale.net_total)
            );
            for account in &result.accounts {
                print_balance(account);
            }
            if let Some(customer) = &result.customer {
                print_party_balance(customer);
            }
        })
    }

    pub fn accounts(&self, accounts: &[Account]) -> Result<()> {
        self.emit(&accounts, || {
            if accounts.is_empty() {
                println!("No accounts found.");
                return;
            }
            println!(
                "{:<20} {:<12} {:>12} {:>12} {:<8}",
                "NAME", "TYPE", "BALANCE", "AVAILABLE", "CURRENCY"
            );
            println!("{}", "-".repeat(68));
            for account in accounts {
                let available = account
                    .available_credit()
                    .map(format_cents)
                    .unwrap_or_default();
                println!(
                    "{:<20} {:<12} {:>12} {:>12} {:<8}{}",
                    truncate(&account.name, 20),
                    account.account_type,
                    format_cents(account.current_balance),
                    available,
                    account.currency,
                    if account.is_default { " *" } else { "" }
                );
            }
        })
    }

    pub fn account_detail(&self, account: &Account, recent: &[LedgerTransaction]) -> Result<()> {
        #[derive(Serialize)]
        struct Detail<'a> {
            account: &'a Account,
            transactions: &'a [LedgerTransaction],
        }

        self.emit(
            &Detail {
                account,
                transactions: recent,
            },
            || {
                println!("Account: {}", account.name);
                println!("  ID:         {}", account.id);
                println!("  Type:       {}", account.account_type);
                println!("  Currency:   {}", account.currency);
                println!("  Default:    {}", if account.is_default { "yes" } else { "no" });
                println!("  Opening:    {}", format_cents(account.initial_balance));
                println!("  Balance:    {}", format_cents(account.current_balance));
                if let (Some(limit), Some(available)) =
                    (account.credit_limit, account.available_credit())
                {
                    println!("  Limit:      {}", format_cents(limit));
                    println!("  Available:  {}", format_cents(available));
                }
                println!("  Entries:    {}", recent.len());
            },
        )
    }

    pub fn counterparties(&self, parties: &[Counterparty]) -> Result<()> {
        self.emit(&parties, || {
            if parties.is_empty() {
                println!("No counter-parties found.");
                return;
            }
            println!("{:<24} {:<12} {:>12} {:>14}", "NAME", "KIND", "BALANCE", "SECONDARY");
            println!("{}", "-".repeat(65));
            for party in parties {
                let secondary = match &party.secondary_currency {
                    Some(currency) => {
                        format!("{} {}", format_cents(party.secondary_balance), currency)
                    }
                    None => String::new(),
                };
                println!(
                    "{:<24} {:<12} {:>12} {:>14}",
                    truncate(&party.name, 24),
                    party.kind,
                    format_cents(party.balance),
                    secondary
                );
            }
        })
    }

    pub fn counterparty_detail(
        &self,
        party: &Counterparty,
        history: &[CounterpartyTransaction],
    ) -> Result<()> {
        #[derive(Serialize)]
        struct Detail<'a> {
            counterparty: &'a Counterparty,
            transactions: &'a [CounterpartyTransaction],
        }

        self.emit(
            &Detail {
                counterparty: party,
                transactions: history,
            },
            || {
                println!("{}: {}", party.kind, party.name);
                println!("  ID:       {}", party.id);
                println!("  Balance:  {}", format_cents(party.balance));
                if let Some(currency) = &party.secondary_currency {
                    println!(
                        "  Secondary: {} {}",
                        format_cents(party.secondary_balance),
                        currency
                    );
                }
                if history.is_empty() {
                    return;
                }
                println!();
                println!(
                    "{:<12} {:<8} {:>10} {:>10} DESCRIPTION",
                    "DATE", "KIND", "AMOUNT", "BALANCE"
                );
                println!("{}", "-".repeat(70));
                for tx in history {
                    println!(
                        "{:<12} {:<8} {:>10} {:>10} {}",
                        tx.date.format("%Y-%m-%d"),
                        tx.kind,
                        format_cents(tx.amount),
                        format_cents(tx.balance_after),
                        truncate(&tx.description, 30)
                    );
                }
            },
        )
    }

    pub fn transactions(
        &self,
        transactions: &[LedgerTransaction],
        accounts: &[Account],
    ) -> Result<()> {
        self.emit(&transactions, || {
            if transactions.is_empty() {
                println!("No transactions found.");
                return;
            }
            let names: HashMap<AccountId, &str> = accounts
                .iter()
                .map(|a| (a.id, a.name.as_str()))
                .collect();

            println!(
                "{:<12} {:<17} {:>10} {:>10} {:<15} {:<36} DESCRIPTION",
                "DATE", "KIND", "AMOUNT", "BALANCE", "ACCOUNT", "ID"
            );
            println!("{}", "-".repeat(120));
            for tx in transactions {
                let account = names.get(&tx.account_id).copied().unwrap_or("?");
                println!(
                    "{:<12} {:<17} {:>10} {:>10} {:<15} {:<36} {}",
                    tx.date.format("%Y-%m-%d"),
                    tx.kind,
                    format_cents(tx.amount),
                    format_cents(tx.balance_after),
                    truncate(account, 15),
                    tx.id,
                    truncate(&tx.description, 30)
                );
            }
        })
    }

    pub fn integrity(&self, report: &IntegrityReport) -> Result<()> {
        self.emit(report, || {
            println!("Checking ledger integrity...\n");
            println!("Accounts:        {}", report.account_count);
            println!("Counter-parties: {}", report.counterparty_count);
            println!("Transactions:    {}", report.transaction_count);
            println!();

            if report.is_healthy() {
                println!("Ledger is consistent.");
            } else {
                println!("Issues found:");
                for issue in &report.issues {
                    println!("  - {}", issue);
                }
            }
        })
    }
}

fn print_balance(account: &Account) {
    match account.available_credit() {
        Some(available) => println!(
            "  {}: owed {} {} (available {})",
            account.name,
            format_cents(account.current_balance),
            account.currency,
            format_cents(available)
        ),
        None => println!(
            "  {}: {} {}",
            account.name,
            format_cents(account.current_balance),
            account.currency
        ),
    }
}

fn print_party_balance(party: &Counterparty) {
    println!("  {} balance: {}", party.name, format_cents(party.balance));
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
