//! Sales, service tickets and counter-party money.

use tracing::instrument;

use crate::domain::{
    Account, Cents, CounterpartyKind, CounterpartyTransaction, CounterpartyTxKind, Counterparty,
    Direction, LedgerTransaction, NewSale, ProductId, SaleId, SaleLine, TxKind, TxLink,
    format_cents, lines_total, validate_lines,
};

use super::saga::{Compensation, Saga};
use super::service::{
    customer_only, description_or, ensure_can_apply, quantities_by_product, require_positive,
};
use super::{
    AppError, ChargeRequest, ChargeResult, PaymentRequest, PaymentResult, SaleRequest,
    SaleResult, SaleTender, ServiceRequest, ServiceResult, SettlementService, VoidSaleResult,
};

/// Who receives the money of a sale once the tender is resolved.
enum Payee {
    Account(Account),
    Customer(Counterparty),
}

impl SettlementService {
    // ========================
    // Sales
    // ========================

    /// Settle a counter sale: take stock, record the sale and move the
    /// money to the tendered account or onto the customer's balance.
    #[instrument(skip(self, request), fields(lines = request.lines.len(), discount = request.discount))]
    pub async fn settle_sale(&self, request: SaleRequest) -> Result<SaleResult, AppError> {
        let mut saga = Saga::new("settle_sale", &self.stores);

        if request.lines.is_empty() {
            return Err(AppError::validation("A sale needs at least one line"));
        }
        validate_lines(&request.lines).map_err(AppError::Validation)?;
        if request.discount < 0 {
            return Err(AppError::validation("Discount cannot be negative"));
        }
        let gross = lines_total(&request.lines).map_err(AppError::Validation)?;
        let net_total = gross - request.discount;
        if net_total < 0 {
            return Err(AppError::validation(format!(
                "Discount {} exceeds the sale total {}",
                format_cents(request.discount),
                format_cents(gross)
            )));
        }

        let payee = self.resolve_tender(request.tender).await?;
        match &payee {
            Payee::Customer(customer) => check_rate(customer, request.exchange_rate)?,
            Payee::Account(_) if request.exchange_rate.is_some() => {
                return Err(AppError::validation(
                    "An exchange rate only applies to sales on credit",
                ));
            }
            Payee::Account(_) => {}
        }
        let stocked = self.check_stock(&request.lines).await?;

        for (product_id, quantity) in &stocked {
            saga.step(
                "take stock",
                self.stores.stock.decrement(*product_id, *quantity),
                |_| Compensation::RestoreStock {
                    product_id: *product_id,
                    quantity: *quantity,
                },
            )
            .await?;
        }

        let customer_id = match &payee {
            Payee::Customer(customer) => Some(customer.id),
            Payee::Account(_) => None,
        };
        let new_sale = NewSale {
            date: request.date,
            lines: request.lines,
            discount: request.discount,
            net_total,
            customer_id,
            service_id: None,
        };
        let sale_id = saga
            .step(
                "create sale",
                self.stores.sales.create_sale(&new_sale),
                |id| Compensation::DeleteSale(*id),
            )
            .await?;

        let description = description_or(request.description, || format!("Sale {}", sale_id));

        // A fully discounted sale moves no money.
        if net_total == 0 {
            saga.commit();
            return Ok(SaleResult {
                sale_id,
                net_total,
                transaction: None,
                account: None,
                charge: None,
                customer: None,
            });
        }

        match payee {
            Payee::Account(account) => {
                let delta = account.signed_amount(Direction::Inflow, net_total);
                let balance = saga
                    .step(
                        "credit payment account",
                        self.stores.accounts.increment(account.id, delta),
                        |_| Compensation::AccountIncrement {
                            account_id: account.id,
                            delta: -delta,
                        },
                    )
                    .await?;

                let transaction = LedgerTransaction::new(
                    account.id,
                    TxKind::SalePayment,
                    delta,
                    new_sale.date,
                    TxLink::SalePayment { sale_id },
                )
                .with_description(description)
                .with_balance_after(balance);

                saga.final_step(
                    "append sale payment",
                    self.stores.ledger.append(&transaction),
                )
                .await?;
                saga.commit();

                Ok(SaleResult {
                    sale_id,
                    net_total,
                    transaction: Some(self.stored_or(transaction).await),
                    account: Some(self.fresh_account(account, balance).await),
                    charge: None,
                    customer: None,
                })
            }
            Payee::Customer(customer) => {
                let mut charge = CounterpartyTransaction::new(
                    customer.id,
                    CounterpartyTxKind::Charge,
                    net_total,
                    new_sale.date,
                )
                .with_sale(sale_id)
                .with_description(description);
                if let Some(rate) = request.exchange_rate {
                    charge = charge.with_exchange_rate(rate);
                }

                let charge = self.book_counterparty_entry(&mut saga, &customer, charge).await?;
                saga.commit();

                let customer = self.fresh_counterparty(customer, charge.balance_after).await;
                Ok(SaleResult {
                    sale_id,
                    net_total,
                    transaction: None,
                    account: None,
                    charge: Some(charge),
                    customer: Some(customer),
                })
            }
        }
    }

    async fn resolve_tender(&self, tender: SaleTender) -> Result<Payee, AppError> {
        let account = match tender {
            SaleTender::Account(id) => self.stores.accounts.read(id).await?,
            SaleTender::DefaultOf(account_type) => self.default_account(account_type).await?,
            SaleTender::OnCredit(customer_id) => {
                let customer = self.stores.counterparties.read(customer_id).await?;
                customer_only(&customer)?;
                return Ok(Payee::Customer(customer));
            }
        };
        if account.is_credit_card() {
            return Err(AppError::validation(format!(
                "{} is a credit card; sales settle into cash, bank or POS accounts",
                account.name
            )));
        }
        Ok(Payee::Account(account))
    }

    /// Stocked products with the quantity each line set needs. Fails before
    /// anything is touched when one of them is short.
    async fn check_stock(&self, lines: &[SaleLine]) -> Result<Vec<(ProductId, i64)>, AppError> {
        let mut stocked = Vec::new();
        for (product_id, requested) in quantities_by_product(lines) {
            match self.stores.stock.available(product_id).await? {
                Some(available) if available < requested => {
                    return Err(AppError::InsufficientStock {
                        product_id,
                        available,
                        requested,
                    });
                }
                Some(_) => stocked.push((product_id, requested)),
                None => {}
            }
        }
        Ok(stocked)
    }

    /// Append a counter-party entry, move the counter-party balance, then
    /// stamp the entry with the balance the move returned. The stamp is the
    /// last step of every saga that calls this.
    async fn book_counterparty_entry(
        &self,
        saga: &mut Saga<'_>,
        party: &Counterparty,
        entry: CounterpartyTransaction,
    ) -> Result<CounterpartyTransaction, AppError> {
        let balance = self.append_and_move(saga, party, &entry).await?;
        saga.final_step(
            "stamp counter-party balance",
            self.stores.counterparties.set_balance_after(entry.id, balance),
        )
        .await?;

        let stored = self
            .stores
            .counterparties
            .get(entry.id)
            .await
            .ok()
            .flatten()
            .unwrap_or(entry);
        Ok(CounterpartyTransaction {
            balance_after: balance,
            ..stored
        })
    }

    /// The two compensated counter-party steps; returns the new balance.
    async fn append_and_move(
        &self,
        saga: &mut Saga<'_>,
        party: &Counterparty,
        entry: &CounterpartyTransaction,
    ) -> Result<Cents, AppError> {
        let secondary = entry.secondary_amount.unwrap_or(0);

        saga.step(
            "append counter-party entry",
            self.stores.counterparties.append(entry),
            |id| Compensation::RemoveCounterpartyTransaction(*id),
        )
        .await?;
        saga.step(
            "move counter-party balance",
            self.stores
                .counterparties
                .increment(party.id, entry.amount, secondary),
            |_| Compensation::CounterpartyIncrement {
                counterparty_id: party.id,
                delta: -entry.amount,
                secondary_delta: -secondary,
            },
        )
        .await
    }

    /// Undo a sale: reverse the money, return stock, delete the record.
    #[instrument(skip(self))]
    pub async fn void_sale(&self, sale_id: SaleId) -> Result<VoidSaleResult, AppError> {
        let mut saga = Saga::new("void_sale", &self.stores);

        let sale = self
            .stores
            .sales
            .get_sale(sale_id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                entity: "Sale",
                id: sale_id.to_string(),
            })?;

        let payments = self.stores.ledger.find_by_sale(sale_id).await?;
        let charges: Vec<CounterpartyTransaction> = match sale.customer_id {
            Some(customer_id) => self
                .stores
                .counterparties
                .list_transactions(customer_id)
                .await?
                .into_iter()
                .filter(|tx| {
                    tx.kind == CounterpartyTxKind::Charge && tx.related_sale_id == Some(sale_id)
                })
                .collect(),
            None => Vec::new(),
        };

        let mut restock = Vec::new();
        for (product_id, quantity) in quantities_by_product(&sale.lines) {
            if self.stores.stock.available(product_id).await?.is_some() {
                restock.push((product_id, quantity));
            }
        }

        let mut touched_accounts = Vec::new();
        for payment in &payments {
            saga.step(
                "reverse sale payment",
                self.stores
                    .accounts
                    .increment(payment.account_id, -payment.amount),
                |_| Compensation::AccountIncrement {
                    account_id: payment.account_id,
                    delta: payment.amount,
                },
            )
            .await?;
            saga.step(
                "remove sale payment",
                self.stores.ledger.remove_linked(payment.id),
                |_| Compensation::RestoreTransaction(Box::new(payment.clone())),
            )
            .await?;
            touched_accounts.push(payment.account_id);
        }

        for charge in &charges {
            let secondary = charge.secondary_amount.unwrap_or(0);
            saga.step(
                "reverse customer charge",
                self.stores
                    .counterparties
                    .increment(charge.counterparty_id, -charge.amount, -secondary),
                |_| Compensation::CounterpartyIncrement {
                    counterparty_id: charge.counterparty_id,
                    delta: charge.amount,
                    secondary_delta: secondary,
                },
            )
            .await?;
            saga.step(
                "remove customer charge",
                self.stores.counterparties.remove(charge.id),
                |_| Compensation::RestoreCounterpartyTransaction(Box::new(charge.clone())),
            )
            .await?;
        }

        for (product_id, quantity) in &restock {
            saga.step(
                "restore stock",
                self.stores.stock.increment(*product_id, *quantity),
                |_| Compensation::TakeStock {
                    product_id: *product_id,
                    quantity: *quantity,
                },
            )
            .await?;
        }

        saga.final_step("delete sale", self.stores.sales.delete_sale(sale_id))
            .await?;
        saga.commit();

        touched_accounts.dedup();
        let mut accounts = Vec::with_capacity(touched_accounts.len());
        for account_id in touched_accounts {
            if let Ok(account) = self.stores.accounts.read(account_id).await {
                accounts.push(account);
            }
        }
        let customer = match sale.customer_id {
            Some(customer_id) => self.stores.counterparties.read(customer_id).await.ok(),
            None => None,
        };

        Ok(VoidSaleResult {
            sale,
            removed_transactions: payments,
            removed_charges: charges,
            accounts,
            customer,
        })
    }

    // ========================
    // Service tickets
    // ========================

    /// Close a service ticket: take the parts from stock, record the work as
    /// a sale and charge the full cost to the customer. Payments already
    /// linked to the ticket are reported, not charged again.
    #[instrument(skip(self, request), fields(service = %request.service_id, customer = %request.customer_id))]
    pub async fn settle_service(&self, request: ServiceRequest) -> Result<ServiceResult, AppError> {
        let mut saga = Saga::new("settle_service", &self.stores);

        validate_lines(&request.parts).map_err(AppError::Validation)?;
        if request.labor < 0 {
            return Err(AppError::validation("Labor cannot be negative"));
        }
        let total_cost = lines_total(&request.parts)
            .map_err(AppError::Validation)?
            .checked_add(request.labor)
            .ok_or_else(|| AppError::validation("Service cost is too large"))?;
        if total_cost <= 0 {
            return Err(AppError::validation("Service cost must be positive"));
        }

        let customer = self.stores.counterparties.read(request.customer_id).await?;
        customer_only(&customer)?;
        check_rate(&customer, request.exchange_rate)?;

        let already_charged = self
            .stores
            .counterparties
            .list_transactions(customer.id)
            .await?
            .iter()
            .any(|tx| {
                tx.kind == CounterpartyTxKind::Charge
                    && tx.related_service_id == Some(request.service_id)
            });
        if already_charged {
            return Err(AppError::validation(format!(
                "Service {} is already settled",
                request.service_id
            )));
        }

        let stocked = self.check_stock(&request.parts).await?;
        let paid_before = self
            .stores
            .counterparties
            .paid_for_service(request.service_id)
            .await?;

        for (product_id, quantity) in &stocked {
            saga.step(
                "take stock",
                self.stores.stock.decrement(*product_id, *quantity),
                |_| Compensation::RestoreStock {
                    product_id: *product_id,
                    quantity: *quantity,
                },
            )
            .await?;
        }

        let mut lines = request.parts;
        if request.labor > 0 {
            lines.push(SaleLine::free("Labor", 1, request.labor));
        }
        let new_sale = NewSale {
            date: request.date,
            lines,
            discount: 0,
            net_total: total_cost,
            customer_id: Some(customer.id),
            service_id: Some(request.service_id),
        };
        let sale_id = saga
            .step(
                "create sale",
                self.stores.sales.create_sale(&new_sale),
                |id| Compensation::DeleteSale(*id),
            )
            .await?;

        let description = description_or(request.description, || {
            format!("Service {}", request.service_id)
        });
        let mut charge = CounterpartyTransaction::new(
            customer.id,
            CounterpartyTxKind::Charge,
            total_cost,
            request.date,
        )
        .with_sale(sale_id)
        .with_service(request.service_id)
        .with_description(description);
        if let Some(rate) = request.exchange_rate {
            charge = charge.with_exchange_rate(rate);
        }

        let charge = self.book_counterparty_entry(&mut saga, &customer, charge).await?;
        saga.commit();

        let customer = self.fresh_counterparty(customer, charge.balance_after).await;
        Ok(ServiceResult {
            sale_id,
            total_cost,
            paid_before,
            remaining_due: (total_cost - paid_before).max(0),
            charge,
            customer,
        })
    }

    // ========================
    // Counter-party money
    // ========================

    /// Money received from a customer or paid to a supplier or wholesaler.
    #[instrument(skip(self, request), fields(counterparty = %request.counterparty_id, account = %request.account_id, amount = request.amount))]
    pub async fn record_payment(&self, request: PaymentRequest) -> Result<PaymentResult, AppError> {
        let mut saga = Saga::new("record_payment", &self.stores);

        require_positive(request.amount)?;
        let party = self
            .stores
            .counterparties
            .read(request.counterparty_id)
            .await?;
        let account = self.stores.accounts.read(request.account_id).await?;
        check_rate(&party, request.exchange_rate)?;
        if request.service_id.is_some() && party.kind != CounterpartyKind::Customer {
            return Err(AppError::validation(
                "Only customer payments can be tied to a service",
            ));
        }

        let (direction, kind) = if party.kind.owes_shop() {
            let kind = if request.service_id.is_some() {
                TxKind::ServiceIncome
            } else {
                TxKind::CustomerPayment
            };
            (Direction::Inflow, kind)
        } else {
            (Direction::Outflow, TxKind::SupplierPayment)
        };
        let delta = account.signed_amount(direction, request.amount);
        ensure_can_apply(&account, delta, request.override_limit)?;

        let description = description_or(request.description, || match direction {
            Direction::Inflow => format!("Payment from {}", party.name),
            Direction::Outflow => format!("Payment to {}", party.name),
        });

        let mut entry = CounterpartyTransaction::new(
            party.id,
            CounterpartyTxKind::Payment,
            request.amount,
            request.date,
        )
        .with_description(description.clone());
        if let Some(service_id) = request.service_id {
            entry = entry.with_service(service_id);
        }
        if let Some(rate) = request.exchange_rate {
            entry = entry.with_exchange_rate(rate);
        }

        let party_balance = self.append_and_move(&mut saga, &party, &entry).await?;
        let account_balance = saga
            .step(
                "move account balance",
                self.stores.accounts.increment(account.id, delta),
                |_| Compensation::AccountIncrement {
                    account_id: account.id,
                    delta: -delta,
                },
            )
            .await?;

        let link = match (kind, request.service_id) {
            (TxKind::ServiceIncome, Some(service_id)) => TxLink::ServicePayment {
                service_id,
                counterparty_tx_id: entry.id,
            },
            (TxKind::SupplierPayment, _) => TxLink::SupplierPayment {
                counterparty_tx_id: entry.id,
            },
            _ => TxLink::CustomerPayment {
                counterparty_tx_id: entry.id,
            },
        };
        let transaction = LedgerTransaction::new(account.id, kind, delta, request.date, link)
            .with_description(description)
            .with_balance_after(account_balance);

        saga.step(
            "append ledger payment",
            self.stores.ledger.append(&transaction),
            |id| Compensation::RemoveTransaction(*id),
        )
        .await?;
        saga.final_step(
            "stamp counter-party balance",
            self.stores
                .counterparties
                .set_balance_after(entry.id, party_balance),
        )
        .await?;
        saga.commit();

        let counterparty_tx = CounterpartyTransaction {
            balance_after: party_balance,
            ..entry
        };
        Ok(PaymentResult {
            counterparty_tx,
            counterparty: self.fresh_counterparty(party, party_balance).await,
            transaction: self.stored_or(transaction).await,
            account: self.fresh_account(account, account_balance).await,
        })
    }

    /// Book a debt with no money moving: goods bought on credit from a
    /// supplier, or a manual charge to a customer.
    #[instrument(skip(self, request), fields(counterparty = %request.counterparty_id, amount = request.amount))]
    pub async fn charge_counterparty(&self, request: ChargeRequest) -> Result<ChargeResult, AppError> {
        let mut saga = Saga::new("charge_counterparty", &self.stores);

        require_positive(request.amount)?;
        let party = self
            .stores
            .counterparties
            .read(request.counterparty_id)
            .await?;
        check_rate(&party, request.exchange_rate)?;

        let description =
            description_or(request.description, || format!("Charge to {}", party.name));
        let mut charge = CounterpartyTransaction::new(
            party.id,
            CounterpartyTxKind::Charge,
            request.amount,
            request.date,
        )
        .with_description(description);
        if let Some(rate) = request.exchange_rate {
            charge = charge.with_exchange_rate(rate);
        }

        let charge = self.book_counterparty_entry(&mut saga, &party, charge).await?;
        saga.commit();

        let counterparty = self.fresh_counterparty(party, charge.balance_after).await;
        Ok(ChargeResult {
            counterparty_tx: charge,
            counterparty,
        })
    }
}

/// A counter-party keeping a secondary currency needs a rate on every entry;
/// any other counter-party takes none.
fn check_rate(party: &Counterparty, rate: Option<f64>) -> Result<(), AppError> {
    match (rate, party.secondary_currency.as_deref()) {
        (Some(_), None) => Err(AppError::validation(format!(
            "{} does not track a secondary currency",
            party.name
        ))),
        (None, Some(currency)) => Err(AppError::validation(format!(
            "{} tracks {}; an exchange rate is required",
            party.name, currency
        ))),
        (Some(rate), Some(_)) if !rate.is_finite() || rate <= 0.0 => {
            Err(AppError::validation("Exchange rate must be positive"))
        }
        _ => Ok(()),
    }
}
