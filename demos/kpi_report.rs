use chrono::NaiveDate;
use financial_kpi_engine::{
    EngineConfig, KpiName, KpiPipeline, RawTable, Scalar, TransactionFilter, ValueStatus,
};

fn table(label: &str, columns: &[&str], rows: Vec<Vec<Scalar>>) -> anyhow::Result<RawTable> {
    Ok(RawTable::from_rows(columns.iter().copied(), rows)?.with_label(label))
}

fn main() -> anyhow::Result<()> {
    let general_ledger = table(
        "general_ledger.xlsx",
        &["Date", "Account", "Amount"],
        vec![
            vec!["2025-01-04".into(), "Income:Consulting".into(), 12_500.0.into()],
            vec!["2025-01-11".into(), "Cost of Goods Sold".into(), (-4_200.0).into()],
            vec!["2025-01-15".into(), "Expense:Rent".into(), (-1_800.0).into()],
            vec!["2025-01-31".into(), "Expense:Payroll".into(), "(3,100.00)".into()],
        ],
    )?;

    let balance_sheet = table(
        "balance_sheet.xlsx",
        &["Account", "Total"],
        vec![
            vec!["Current Assets".into(), 18_000.0.into()],
            vec!["Fixed Assets".into(), 22_000.0.into()],
            vec!["Current Liabilities".into(), 9_000.0.into()],
            vec!["Long-term Liabilities".into(), 11_000.0.into()],
            vec!["Total Equity".into(), 20_000.0.into()],
        ],
    )?;

    let notes = table(
        "notes.xlsx",
        &["Memo"],
        vec![vec!["Reviewed by the bookkeeper".into()]],
    )?;

    let config = EngineConfig::from_json_str(r#"{ "anomaly": { "contamination": 0.05 } }"#)?;
    let pipeline = KpiPipeline::new(config)?;

    let report = pipeline.process([&general_ledger, &balance_sheet, &notes])?;

    println!("Accepted tables:");
    for table in &report.accepted {
        println!(
            " - {} as {} ({} rows)",
            table.table,
            table.kind.label(),
            table.rows
        );
    }
    for rejection in &report.rejected {
        println!("Skipped {}: {}", rejection.table, rejection.reason);
    }

    println!("\nKPIs (revenue from {:?}):", report.kpis.revenue_source);
    for name in KpiName::ALL {
        let Some(value) = report.kpis.value(name) else {
            continue;
        };
        let marker = match value.status {
            ValueStatus::Computed => "",
            ValueStatus::UndefinedDefaulted => " (undefined)",
        };
        if name.is_ratio() {
            println!("  {:<28} {:>10.4}{}", name.label(), value.value, marker);
        } else {
            println!("  {:<28} {:>10.2}{}", name.label(), value.value, marker);
        }
    }

    let mut transactions = RawTable::new(["Customer:Job", "Amount", "Date"]).with_label("invoices.csv");
    let clients = ["Acme", "Globex", "Initech"];
    for day in 1..=24u32 {
        let date = NaiveDate::from_ymd_opt(2025, 3, day).ok_or_else(|| anyhow::anyhow!("bad day"))?;
        transactions.push_row(vec![
            clients[day as usize % clients.len()].into(),
            (400.0 + f64::from(day) * 7.5).into(),
            date.into(),
        ])?;
    }
    transactions.push_row(vec!["Globex".into(), 48_000.0.into(), "2025-03-28".into()])?;

    let analysis = pipeline.analyze_transactions(&transactions, &TransactionFilter::default())?;

    println!(
        "\n{} transactions from {} clients, total {:.2}",
        analysis.overview.transaction_count,
        analysis.overview.client_count,
        analysis.overview.total_amount
    );
    for client in &analysis.clients {
        println!(
            "  {:<10} total {:>10.2}  last {:?}  anomalies {}",
            client.client_id.to_string(),
            client.total_amount,
            client.last_transaction_date,
            client.anomaly_count
        );
    }
    for record in analysis.anomalies() {
        println!("Flagged: {} {:.2} on {:?}", record.client_id, record.amount, record.date);
    }

    Ok(())
}
