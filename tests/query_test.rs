mod common;

use anyhow::Result;
use common::{ShopAccounts, parse_date, test_service};
use shopledger::application::{EntryRequest, SettlementService};
use shopledger::domain::{AccountId, TxKind};
use shopledger::storage::TransactionFilter;

async fn record_days(service: &SettlementService, account: AccountId, days: u32) -> Result<()> {
    for day in 1..=days {
        service
            .record_income(EntryRequest::new(
                account,
                100 * day as i64,
                parse_date(&format!("2024-03-{:02}", day)),
            ))
            .await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_cursor_pages_in_sequence_order() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;
    record_days(&service, shop.cash.id, 5).await?;

    let mut cursor = service
        .query_transactions(TransactionFilter::for_account(shop.cash.id))
        .with_page_size(2);

    let first = cursor.next_page().await?.expect("first page");
    let second = cursor.next_page().await?.expect("second page");
    let third = cursor.next_page().await?.expect("third page");
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(third.len(), 1);
    assert!(cursor.next_page().await?.is_none());

    let amounts: Vec<i64> = first
        .iter()
        .chain(&second)
        .chain(&third)
        .map(|tx| tx.amount)
        .collect();
    assert_eq!(amounts, vec![100, 200, 300, 400, 500]);

    let sequences: Vec<i64> = first.iter().chain(&second).map(|tx| tx.sequence).collect();
    assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));

    Ok(())
}

#[tokio::test]
async fn test_cursor_rewind_starts_over() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;
    record_days(&service, shop.cash.id, 3).await?;

    let mut cursor = service
        .query_transactions(TransactionFilter::default())
        .with_page_size(2);
    assert_eq!(cursor.collect_all().await?.len(), 3);
    assert!(cursor.next_page().await?.is_none());

    cursor.rewind();
    assert_eq!(cursor.collect_all().await?.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_cursor_sees_records_appended_mid_walk() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;
    record_days(&service, shop.cash.id, 3).await?;

    let mut cursor = service
        .query_transactions(TransactionFilter::default())
        .with_page_size(2);
    let first = cursor.next_page().await?.expect("first page");
    assert_eq!(first.len(), 2);

    service
        .record_income(EntryRequest::new(shop.cash.id, 999, parse_date("2024-03-20")))
        .await?;

    let rest = cursor.collect_all().await?;
    assert_eq!(rest.len(), 2);
    assert_eq!(rest[1].amount, 999);
    assert!(rest.iter().all(|tx| first.iter().all(|seen| seen.id != tx.id)));

    Ok(())
}

#[tokio::test]
async fn test_filter_by_kind_and_account() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;
    record_days(&service, shop.cash.id, 2).await?;
    service
        .record_expense(EntryRequest::new(shop.bank.id, 500, parse_date("2024-03-03")))
        .await?;
    service
        .record_expense(EntryRequest::new(shop.cash.id, 50, parse_date("2024-03-04")))
        .await?;

    let expenses = service
        .query_transactions(TransactionFilter::default().with_kinds(vec![TxKind::Expense]))
        .collect_all()
        .await?;
    assert_eq!(expenses.len(), 2);
    assert!(expenses.iter().all(|tx| tx.kind == TxKind::Expense));

    let bank = service
        .query_transactions(TransactionFilter::for_account(shop.bank.id))
        .collect_all()
        .await?;
    assert_eq!(bank.len(), 1);
    assert_eq!(bank[0].amount, -500);

    let cash_income = service
        .query_transactions(
            TransactionFilter::for_account(shop.cash.id).with_kinds(vec![TxKind::Income]),
        )
        .collect_all()
        .await?;
    assert_eq!(cash_income.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_date_bounds_are_inclusive() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = ShopAccounts::create(&service).await?;
    record_days(&service, shop.cash.id, 5).await?;

    let middle = service
        .query_transactions(TransactionFilter::for_account(shop.cash.id).between(
            Some(parse_date("2024-03-02")),
            Some(parse_date("2024-03-04")),
        ))
        .collect_all()
        .await?;
    let amounts: Vec<i64> = middle.iter().map(|tx| tx.amount).collect();
    assert_eq!(amounts, vec![200, 300, 400]);

    let open_start = service
        .query_transactions(
            TransactionFilter::default().between(None, Some(parse_date("2024-03-01"))),
        )
        .collect_all()
        .await?;
    assert_eq!(open_start.len(), 1);

    Ok(())
}
