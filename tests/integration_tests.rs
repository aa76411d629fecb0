use chrono::NaiveDate;
use financial_kpi_engine::*;

/// Decodes CSV text the way an upload front end would: empty cells are
/// blank, plain numbers are numbers, everything else stays text.
fn table_from_csv(label: &str, data: &str) -> anyhow::Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(false)
        .from_reader(data.as_bytes());

    let headers: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
    let mut table = RawTable::new(headers).with_label(label);

    for record in rdr.records() {
        let record = record?;
        let row = record
            .iter()
            .map(|cell| {
                if cell.trim().is_empty() {
                    Scalar::Blank
                } else if let Ok(n) = cell.trim().parse::<f64>() {
                    Scalar::Number(n)
                } else {
                    Scalar::from(cell)
                }
            })
            .collect();
        table.push_row(row)?;
    }

    Ok(table)
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

const GL_Q1: &str = "\
Date,Account,Amount
2025-01-05,Income:Sales,\"1,200.00\"
2025-01-09,Expense:Rent,-300
2025-01-20,Cost of Goods Sold,-400
";

// The header keeps its leading space; a line continuation would eat it.
const GL_Q2: &str = "\x20Date ,Account,Amount
2025-04-03,Income:Sales,800
2025-04-10,Expense:Payroll,(200)
";

const PNL: &str = "\
Account,Total
Income,99999
Expense,-5
";

const BALANCE_SHEET: &str = "\
Account,Amount
Current Assets,3000
Fixed Assets,2000
Current Liabilities,1500
Long-term Liabilities,500
Total Equity,3000
";

const README: &str = "\
Name,Value
Owner,Jane
";

fn quarterly_batch() -> anyhow::Result<Vec<RawTable>> {
    Ok(vec![
        table_from_csv("gl_q1.csv", GL_Q1)?,
        table_from_csv("gl_q2.csv", GL_Q2)?,
        table_from_csv("pnl.csv", PNL)?,
        table_from_csv("balance_sheet.csv", BALANCE_SHEET)?,
        table_from_csv("readme.csv", README)?,
    ])
}

#[test]
fn test_full_batch_with_one_unrecognized_table() -> anyhow::Result<()> {
    let tables = quarterly_batch()?;
    let report = KpiPipeline::default().process(&tables)?;

    assert_eq!(report.accepted.len(), 4);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].table, "readme.csv");

    let kinds: Vec<StatementKind> = report.accepted.iter().map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StatementKind::GeneralLedger,
            StatementKind::GeneralLedger,
            StatementKind::ProfitAndLoss,
            StatementKind::BalanceSheet,
        ]
    );

    let kpis = &report.kpis;
    assert_eq!(kpis.revenue_source, RevenueSource::GeneralLedger);
    assert_eq!(kpis.values.len(), 13);

    // The P&L summary is ignored because the ledgers have rows.
    assert!(approx(kpis.get(KpiName::TotalRevenue), 2000.0));
    assert!(approx(kpis.get(KpiName::TotalExpenses), -900.0));
    assert!(approx(kpis.get(KpiName::NetIncome), 1100.0));
    assert!(approx(kpis.cogs, -400.0));
    assert!(approx(kpis.get(KpiName::GrossMargin), 0.8));
    assert!(approx(kpis.get(KpiName::NetMargin), 0.55));

    assert!(approx(kpis.get(KpiName::TotalAssets), 5000.0));
    assert!(approx(kpis.get(KpiName::TotalLiabilities), 2000.0));
    assert!(approx(kpis.get(KpiName::TotalEquity), 3000.0));
    assert!(approx(kpis.get(KpiName::CurrentRatio), 2.0));
    assert!(approx(kpis.get(KpiName::DebtToEquity), 2000.0 / 3000.0));
    assert!(approx(kpis.get(KpiName::DebtRatio), 0.4));
    assert!(approx(kpis.get(KpiName::Roe), 1100.0 / 3000.0));
    assert!(approx(kpis.get(KpiName::Roa), 0.22));
    assert!(kpis.undefined_metrics().is_empty());

    Ok(())
}

#[test]
fn test_caller_tables_are_left_untouched() -> anyhow::Result<()> {
    let tables = quarterly_batch()?;
    let before = tables.clone();

    KpiPipeline::default().process(&tables)?;

    assert_eq!(tables, before);
    assert_eq!(tables[1].columns[0], " Date ");
    Ok(())
}

#[test]
fn test_order_and_partitioning_do_not_change_kpis() -> anyhow::Result<()> {
    let tables = quarterly_batch()?;
    let pipeline = KpiPipeline::default();
    let rules = &pipeline.config().rules;

    let whole = pipeline.accumulate(&tables);
    let parts = pipeline
        .accumulate(&tables[..2])
        .merge(pipeline.accumulate(&tables[2..]));
    assert_eq!(whole, parts);

    let mut reversed: Vec<&RawTable> = tables.iter().collect();
    reversed.reverse();
    let shuffled = pipeline.accumulate(reversed);

    let a = compute_kpis(&whole.buckets, rules)?;
    let b = compute_kpis(&shuffled.buckets, rules)?;
    for name in KpiName::ALL {
        assert!(approx(a.get(name), b.get(name)), "{} differs", name.as_str());
    }
    Ok(())
}

#[test]
fn test_single_ledger_example() -> anyhow::Result<()> {
    let gl = table_from_csv(
        "gl.csv",
        "Date,Account,Amount\n2025-01-01,Income:Sales,1000\n2025-01-02,Expense:Rent,-200\n",
    )?;

    let report = process_statements([&gl], &EngineConfig::default())?;
    let kpis = &report.kpis;

    assert_eq!(kpis.get(KpiName::TotalRevenue), 1000.0);
    assert_eq!(kpis.get(KpiName::TotalExpenses), -200.0);
    assert_eq!(kpis.get(KpiName::NetIncome), 800.0);
    assert_eq!(kpis.get(KpiName::GrossMargin), 0.0);
    assert!(!kpis.is_defined(KpiName::GrossMargin));
    assert_eq!(kpis.get(KpiName::NetMargin), 0.8);

    // No balance sheet: totals are zero and the four ratios default.
    assert_eq!(kpis.get(KpiName::TotalAssets), 0.0);
    for name in [
        KpiName::CurrentRatio,
        KpiName::DebtToEquity,
        KpiName::DebtRatio,
        KpiName::Roe,
        KpiName::Roa,
    ] {
        assert_eq!(kpis.get(name), 0.0);
        assert_eq!(
            kpis.value(name).map(|v| v.status),
            Some(ValueStatus::UndefinedDefaulted)
        );
    }
    Ok(())
}

#[test]
fn test_ledger_rows_without_a_date_are_not_counted() -> anyhow::Result<()> {
    let gl = table_from_csv(
        "gl.csv",
        "Date,Account,Amount\n2025-01-05,Income:Sales,1000\ngarbage,Income:Sales,5000\n,Income:Sales,7000\n",
    )?;

    let report = KpiPipeline::default().process([&gl])?;
    assert_eq!(report.kpis.revenue_source, RevenueSource::GeneralLedger);
    assert_eq!(report.kpis.get(KpiName::TotalRevenue), 1000.0);
    assert_eq!(report.accepted[0].rows, 1);
    assert_eq!(report.accepted[0].dropped_rows, 2);
    Ok(())
}

#[test]
fn test_zero_equity_defaults_instead_of_failing() -> anyhow::Result<()> {
    let pnl = table_from_csv("pnl.csv", "Account,Amount\nIncome,500\nExpense,-100\n")?;
    let bs = table_from_csv(
        "bs.csv",
        "Account,Amount\nTotal Assets,1000\nTotal Liabilities,1000\nOwner Equity,0\n",
    )?;

    let report = KpiPipeline::default().process([&pnl, &bs])?;
    assert_eq!(report.kpis.revenue_source, RevenueSource::ProfitAndLoss);
    assert_eq!(report.kpis.get(KpiName::DebtToEquity), 0.0);
    assert_eq!(report.kpis.get(KpiName::Roe), 0.0);
    assert!(!report.kpis.is_defined(KpiName::Roe));
    assert_eq!(report.kpis.get(KpiName::DebtRatio), 1.0);
    Ok(())
}

#[test]
fn test_only_unrecognized_tables_is_an_error() -> anyhow::Result<()> {
    let readme = table_from_csv("readme.csv", README)?;
    let err = KpiPipeline::default().process([&readme]).unwrap_err();
    assert!(matches!(err, KpiEngineError::EmptyInputSet));
    Ok(())
}

#[test]
fn test_custom_rule_set_from_json() -> anyhow::Result<()> {
    let table = table_from_csv(
        "services.csv",
        "Account,Amount\nRevenue - Services,500\nCost of Goods Sold,-100\n",
    )?;

    assert!(KpiPipeline::default().process([&table]).is_err());

    let mut config = EngineConfig::default();
    config.rules.version = 2;
    config
        .rules
        .statement_keywords
        .profit_and_loss
        .push("Revenue".to_string());
    for rule in &mut config.rules.categories {
        if rule.category == AccountCategory::Revenue {
            rule.keywords.push("Revenue".to_string());
        }
    }

    let loaded = EngineConfig::from_json_str(&config.to_json()?)?;
    assert_eq!(loaded, config);

    let report = KpiPipeline::new(loaded)?.process([&table])?;
    assert_eq!(report.accepted[0].kind, StatementKind::ProfitAndLoss);
    assert_eq!(report.kpis.get(KpiName::TotalRevenue), 500.0);
    assert_eq!(report.kpis.get(KpiName::GrossMargin), 0.8);
    assert_eq!(report.chart_of_accounts.rule_set_version, 2);
    Ok(())
}

#[test]
fn test_chart_of_accounts_in_report() -> anyhow::Result<()> {
    let tables = quarterly_batch()?;
    let report = KpiPipeline::default().process(&tables)?;
    let chart = &report.chart_of_accounts;

    let revenue: Vec<&str> = chart
        .accounts_in(AccountCategory::Revenue)
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(revenue, vec!["Income:Sales", "Income"]);

    let sales = chart
        .accounts
        .iter()
        .find(|a| a.name == "Income:Sales")
        .unwrap();
    assert_eq!(sales.row_count, 2);
    assert!(approx(sales.total, 2000.0));
    Ok(())
}

const CLIENTS: &str = "\
client_id,transaction_amount,transaction_date
101,1000,2025-03-01
101,1000,2025-03-01
102,,2025-03-02
103,500,03/05/2025
";

#[test]
fn test_client_summary_from_csv() -> anyhow::Result<()> {
    let table = table_from_csv("clients.csv", CLIENTS)?;
    let summary = summarize(&table, &NormalizerConfig::default())?;

    assert_eq!(summary.len(), 3);
    assert_eq!(summary[0].client_id, Scalar::Number(101.0));
    assert_eq!(summary[0].total_amount, 1000.0);
    assert_eq!(summary[0].last_transaction_date, Some(date(2025, 3, 1)));

    // Imputed with the mean taken before duplicates were dropped.
    assert!(approx(summary[1].total_amount, 2500.0 / 3.0));
    assert_eq!(summary[2].last_transaction_date, Some(date(2025, 3, 5)));
    Ok(())
}

#[test]
fn test_client_summary_from_accounting_export_columns() -> anyhow::Result<()> {
    let table = table_from_csv(
        "export.csv",
        "Customer:Job,Date,Amount\nAcme,2025-02-01,250\nAcme,2025-02-09,750\nBeta,2025-02-03,100\n",
    )?;

    let summary = summarize(&table, &NormalizerConfig::default())?;
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].client_id, Scalar::from("Acme"));
    assert_eq!(summary[0].total_amount, 1000.0);
    assert_eq!(summary[0].last_transaction_date, Some(date(2025, 2, 9)));
    Ok(())
}

fn transactions_with_outlier() -> anyhow::Result<RawTable> {
    let mut data = String::from("client_id,transaction_amount,transaction_date\n");
    for i in 0..30 {
        data.push_str(&format!(
            "{},{},2025-01-{:02}\n",
            100 + i % 4,
            95 + i,
            i + 1
        ));
    }
    data.push_str("101,25000,2025-02-15\n");
    table_from_csv("transactions.csv", &data)
}

#[test]
fn test_transaction_analysis_flags_outlier() -> anyhow::Result<()> {
    let table = transactions_with_outlier()?;
    let analysis = analyze_transactions(&table, &TransactionFilter::default(), &EngineConfig::default())?;

    assert_eq!(analysis.records.len(), 31);
    assert_eq!(analysis.tags.len(), 31);
    assert_eq!(analysis.anomaly_count(), 1);

    let flagged: Vec<&TransactionRecord> = analysis.anomalies().collect();
    assert_eq!(flagged[0].amount, 25000.0);

    let client_101 = analysis
        .clients
        .iter()
        .find(|c| c.client_id == Scalar::Number(101.0))
        .unwrap();
    assert_eq!(client_101.anomaly_count, 1);
    assert_eq!(
        analysis.clients.iter().map(|c| c.anomaly_count).sum::<usize>(),
        1
    );

    assert_eq!(analysis.overview.client_count, 4);
    assert_eq!(analysis.overview.first_date, Some(date(2025, 1, 1)));
    assert_eq!(analysis.overview.last_date, Some(date(2025, 2, 15)));

    assert_eq!(analysis.daily_totals.len(), 31);
    assert_eq!(analysis.daily_totals[0], (date(2025, 1, 1), 95.0));
    assert_eq!(analysis.daily_totals[30], (date(2025, 2, 15), 25000.0));
    let daily_sum: f64 = analysis.daily_totals.iter().map(|(_, v)| v).sum();
    assert!(approx(daily_sum, analysis.overview.total_amount));
    Ok(())
}

#[test]
fn test_filtering_changes_what_is_tagged() -> anyhow::Result<()> {
    let table = transactions_with_outlier()?;
    let pipeline = KpiPipeline::default();

    let january = TransactionFilter::default().between_dates(date(2025, 1, 1), date(2025, 1, 31));
    let analysis = pipeline.analyze_transactions(&table, &january)?;
    assert_eq!(analysis.records.len(), 30);
    assert!(analysis.records.iter().all(|r| r.amount < 25000.0));

    let few = TransactionFilter::default().amount_between(95.0, 100.0);
    let analysis = pipeline.analyze_transactions(&table, &few)?;
    assert_eq!(analysis.records.len(), 6);
    assert!(analysis
        .tags
        .iter()
        .all(|t| *t == AnomalyTag::InsufficientData));
    Ok(())
}

#[test]
fn test_detection_is_reproducible_across_runs() -> anyhow::Result<()> {
    let table = transactions_with_outlier()?;
    let first = KpiPipeline::default().analyze_transactions(&table, &TransactionFilter::default())?;
    let second = KpiPipeline::default().analyze_transactions(&table, &TransactionFilter::default())?;
    assert_eq!(first.tags, second.tags);
    Ok(())
}

#[test]
fn test_report_serializes_with_schema() -> anyhow::Result<()> {
    let tables = quarterly_batch()?;
    let report = KpiPipeline::default().process(&tables)?;

    let json: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
    assert_eq!(json["rejected"][0]["table"], "readme.csv");
    assert!(json["kpis"]["values"]["net_income"]["value"].is_number());

    let schema: serde_json::Value = serde_json::from_str(&KpiReport::schema_as_json()?)?;
    assert!(schema["properties"]["kpis"].is_object());
    Ok(())
}
