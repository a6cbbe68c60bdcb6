mod common;

use anyhow::Result;
use common::{ShopAccounts, all_transactions, balance, parse_date, test_service};
use shopledger::application::{AppError, EntryRequest, TransferRequest};
use shopledger::domain::{Account, AccountType, TxKind, TxLink};

#[tokio::test]
async fn test_transfer_moves_money_between_accounts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;

    let result = service
        .transfer(
            TransferRequest::new(shop.cash.id, shop.bank.id, 5000, parse_date("2024-03-10"))
                .with_description("Bank deposit"),
        )
        .await?;

    assert_eq!(result.from_account.current_balance, 5000);
    assert_eq!(result.to_account.current_balance, 7000);

    assert_eq!(result.out_leg.amount, -5000);
    assert_eq!(result.out_leg.kind, TxKind::TransferOut);
    assert_eq!(result.in_leg.amount, 5000);
    assert_eq!(result.in_leg.kind, TxKind::TransferIn);
    assert_eq!(result.out_leg.transfer_pair(), Some(result.in_leg.id));
    assert_eq!(result.in_leg.transfer_pair(), Some(result.out_leg.id));
    assert_eq!(result.out_leg.description, "Bank deposit");
    assert!(result.out_leg.sequence < result.in_leg.sequence);

    let report = service.check_integrity().await?;
    assert!(report.is_healthy(), "{:?}", report.issues);

    Ok(())
}

#[tokio::test]
async fn test_pay_credit_card_reduces_debt() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;
    service
        .record_income(EntryRequest::new(shop.cash.id, 20000, parse_date("2024-03-01")))
        .await?;
    assert_eq!(balance(&service, shop.cash.id).await?, 30000);

    let result = service
        .pay_credit_card(TransferRequest::new(
            shop.cash.id,
            shop.card.id,
            15000,
            parse_date("2024-03-10"),
        ))
        .await?;

    assert_eq!(result.from_account.current_balance, 15000);
    assert_eq!(result.to_account.current_balance, 5000);
    assert_eq!(result.to_account.available_credit(), Some(45000));
    assert_eq!(result.out_leg.amount, -15000);
    assert_eq!(result.in_leg.amount, -15000);
    assert_eq!(result.in_leg.description, "Payment of Visa from Cash");

    let report = service.check_integrity().await?;
    assert!(report.is_healthy(), "{:?}", report.issues);

    Ok(())
}

#[tokio::test]
async fn test_pay_credit_card_requires_card_target() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;

    let err = service
        .pay_credit_card(TransferRequest::new(
            shop.cash.id,
            shop.bank.id,
            1000,
            parse_date("2024-03-10"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(all_transactions(&service).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_transfer_between_cards_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;
    let other_card = service
        .create_account(
            Account::new("Amex".into(), AccountType::CreditCard, "EUR".into())
                .with_credit_limit(100000),
        )
        .await?;

    let err = service
        .transfer(TransferRequest::new(
            shop.card.id,
            other_card.id,
            1000,
            parse_date("2024-03-10"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(balance(&service, shop.card.id).await?, 20000);
    assert_eq!(balance(&service, other_card.id).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_transfer_requires_matching_currency() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;
    let dollars = service
        .create_account(
            Account::new("USD Bank".into(), AccountType::Bank, "USD".into())
                .with_initial_balance(5000),
        )
        .await?;

    let err = service
        .transfer(TransferRequest::new(
            shop.cash.id,
            dollars.id,
            1000,
            parse_date("2024-03-10"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    Ok(())
}

#[tokio::test]
async fn test_transfer_to_same_account_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;

    let err = service
        .transfer(TransferRequest::new(
            shop.cash.id,
            shop.cash.id,
            1000,
            parse_date("2024-03-10"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    Ok(())
}

#[tokio::test]
async fn test_transfer_cannot_overdraw_source() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;

    let err = service
        .transfer(TransferRequest::new(
            shop.bank.id,
            shop.cash.id,
            2001,
            parse_date("2024-03-10"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds { .. }));
    assert_eq!(balance(&service, shop.bank.id).await?, 2000);
    assert_eq!(balance(&service, shop.cash.id).await?, 10000);

    Ok(())
}

#[tokio::test]
async fn test_cash_advance_from_card_checks_limit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;

    // Drawing from a card grows its debt.
    let result = service
        .transfer(TransferRequest::new(
            shop.card.id,
            shop.cash.id,
            10000,
            parse_date("2024-03-10"),
        ))
        .await?;
    assert_eq!(result.out_leg.amount, 10000);
    assert_eq!(result.from_account.current_balance, 30000);

    let err = service
        .transfer(TransferRequest::new(
            shop.card.id,
            shop.cash.id,
            30000,
            parse_date("2024-03-11"),
        ))
        .await
        .unwrap_err();
    assert!(err.requires_override());

    Ok(())
}

#[tokio::test]
async fn test_void_transfer_restores_both_accounts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;

    let transfer = service
        .transfer(TransferRequest::new(
            shop.cash.id,
            shop.bank.id,
            5000,
            parse_date("2024-03-10"),
        ))
        .await?;

    // Either leg identifies the pair.
    let result = service.void_transfer(transfer.in_leg.id).await?;
    assert_eq!(result.removed.len(), 2);
    assert_eq!(result.accounts.len(), 2);

    assert_eq!(balance(&service, shop.cash.id).await?, 10000);
    assert_eq!(balance(&service, shop.bank.id).await?, 2000);
    assert!(all_transactions(&service).await?.is_empty());

    let report = service.check_integrity().await?;
    assert!(report.is_healthy(), "{:?}", report.issues);

    Ok(())
}

#[tokio::test]
async fn test_void_transfer_rejects_manual_entry() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;

    let expense = service
        .record_expense(EntryRequest::new(shop.cash.id, 1000, parse_date("2024-03-10")))
        .await?;
    assert!(matches!(
        expense.transaction.link,
        TxLink::ManualEntry { category_id: None }
    ));

    let err = service
        .void_transfer(expense.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotEditable { .. }));
    assert_eq!(balance(&service, shop.cash.id).await?, 9000);

    Ok(())
}
