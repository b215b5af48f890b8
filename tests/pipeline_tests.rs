
use calamine::{open_workbook, Reader, Xlsx};
use chrono::NaiveDate;
use dre::config::Config;
use dre::error::DreError;
use dre::period::{PeriodSource, ReportPeriod};
use dre::pipeline::DreGenerator;
use dre::workbook::{self, CellValue};
use rust_decimal_macros::dec;
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;
use workbook_fixtures::{write_source_workbook, FixtureOptions};

fn formula(text: &str) -> Option<CellValue> {
    Some(CellValue::Formula(text.to_string()))
}

#[test]
fn test_run_writes_report_and_waterfall() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("entrada.xlsx");
    let output = dir.path().join("saida.xlsx");
    write_source_workbook(&input, FixtureOptions::default()).unwrap();

    let summary = DreGenerator::new(Config::default())
        .run(&input, &output)
        .unwrap();

    assert_eq!(
        summary.period,
        ReportPeriod::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 3)
    );
    assert_eq!(summary.period_source, PeriodSource::Detected);
    assert_eq!(summary.investments, 2);
    assert_eq!(summary.depreciation_totals, vec![dec!(0), dec!(100), dec!(120)]);
    assert_eq!(summary.output.as_deref(), Some(output.as_path()));

    assert_eq!(summary.invalid_dates.len(), 1);
    assert_eq!(summary.invalid_dates[0].sheet, "Custo_Despesas");
    assert_eq!(summary.invalid_dates[0].row, 7);
    assert_eq!(summary.invalid_dates[0].value.to_string(), "not-a-date");

    let result = workbook::load(&output).unwrap();
    assert_eq!(result.sheet_names()[0], "DRE");

    let dre = result.sheet("DRE").unwrap();
    assert_eq!(dre.value(1, 1), Some(&CellValue::from("DRE")));
    assert_eq!(dre.value(4, 2), Some(&CellValue::from("Receita ")));
    assert_eq!(dre.value(3, 5), formula("=EDATE(D3, 1)").as_ref());
    assert_eq!(dre.value(16, 4), formula("=D4+D7").as_ref());
    assert_eq!(dre.value(33, 6), formula("=-Investimentos!L1").as_ref());
    assert_eq!(dre.value(51, 4), formula("=-D49*0.3").as_ref());
    assert!(dre.value(4, 7).is_none());

    let inv = result.sheet("Investimentos").unwrap();
    assert_eq!(inv.value(1, 5), Some(&CellValue::from("TOTAL D&A")));
    assert_eq!(inv.value(1, 10), formula("=SUM(J6:J8)").as_ref());
    assert_eq!(inv.value(7, 6), Some(&CellValue::from("Software")));
    assert_eq!(
        inv.value(6, 10),
        formula("=IF(AND(J5>=DATE(2024,2,1),J5<DATE(2027,2,1)),I6,0)").as_ref()
    );
    // Source investments are kept
    assert_eq!(inv.value(2, 2), Some(&CellValue::from("Equipamento")));
}

fn package_part(path: &Path, part: &str) -> String {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut content = String::new();
    archive
        .by_name(part)
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    content
}

#[test]
fn test_in_place_run_keeps_source_formatting() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("entrada.xlsx");
    write_source_workbook(
        &input,
        FixtureOptions {
            formatted_sales: true,
            ..FixtureOptions::default()
        },
    )
    .unwrap();

    DreGenerator::new(Config::default())
        .run(&input, &input)
        .unwrap();

    let styles = package_part(&input, "xl/styles.xml");
    assert!(styles.contains("R$"), "currency format lost: {styles}");

    let excel: Xlsx<_> = open_workbook(&input).unwrap();
    assert!(excel
        .defined_names()
        .iter()
        .any(|(name, formula)| name == "Taxa" && formula.contains("Vendas!$E$2")));

    let vendas = workbook::package::read_sheet_xml(&input, "Vendas").unwrap();
    assert!(vendas.contains("<cols>"), "column widths lost: {vendas}");
    assert!(vendas.contains(r#"min="5""#));

    let dre = workbook::package::read_sheet_xml(&input, "DRE").unwrap();
    assert!(dre.contains(r#"state="frozen""#));
    assert!(dre.contains(r#"topLeftCell="D4""#));
    assert!(dre.contains(r#"outlineLevel="1""#));
    assert!(dre.contains(r#"collapsed="1""#));

    let result = workbook::load(&input).unwrap();
    assert_eq!(
        result.sheet("Vendas").unwrap().value(2, 5),
        Some(&CellValue::Number(1000.0))
    );
}

#[test]
fn test_missing_financing_is_reported_as_degraded() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("entrada.xlsx");
    write_source_workbook(&input, FixtureOptions::default()).unwrap();

    let summary = DreGenerator::new(Config::default())
        .run(&input, &input)
        .unwrap();
    assert_eq!(summary.degraded.len(), 1);
    assert_eq!(summary.degraded[0].row, 38);
    assert_eq!(summary.degraded[0].missing_sheet, "Financiamento");

    let result = workbook::load(&input).unwrap();
    let dre = result.sheet("DRE").unwrap();
    assert_eq!(dre.value(38, 4), Some(&CellValue::Number(0.0)));
}

#[test]
fn test_financing_sheet_feeds_interest_line() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("entrada.xlsx");
    write_source_workbook(
        &input,
        FixtureOptions {
            financing: true,
            ..FixtureOptions::default()
        },
    )
    .unwrap();

    let summary = DreGenerator::new(Config::default())
        .run(&input, &input)
        .unwrap();
    assert!(summary.degraded.is_empty());

    let result = workbook::load(&input).unwrap();
    let interest = result.sheet("DRE").unwrap().value(38, 4).cloned();
    match interest {
        Some(CellValue::Formula(f)) => assert!(f.starts_with("=-SUMIFS(Financiamento!$J$5:$AZ$5")),
        other => panic!("expected interest formula, got {other:?}"),
    }
}

#[test]
fn test_existing_report_is_replaced() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("entrada.xlsx");
    write_source_workbook(
        &input,
        FixtureOptions {
            existing_report: true,
            ..FixtureOptions::default()
        },
    )
    .unwrap();

    let summary = DreGenerator::new(Config::default())
        .run(&input, &input)
        .unwrap();
    assert!(summary.replaced_existing);

    let result = workbook::load(&input).unwrap();
    assert_eq!(
        result.sheet_names(),
        vec!["DRE", "Vendas", "Custo_Despesas", "Folha", "Investimentos"]
    );
    let dre = result.sheet("DRE").unwrap();
    assert_eq!(dre.value(1, 1), Some(&CellValue::from("DRE")));
    assert!(dre.value(11, 11).is_none());
}

#[test]
fn test_second_run_rebuilds_identical_report() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("entrada.xlsx");
    let first = dir.path().join("first.xlsx");
    let second = dir.path().join("second.xlsx");
    write_source_workbook(&input, FixtureOptions::default()).unwrap();

    let generator = DreGenerator::new(Config::default());
    generator.run(&input, &first).unwrap();
    let summary = generator.run(&first, &second).unwrap();
    assert!(summary.replaced_existing);

    let a = workbook::load(&first).unwrap();
    let b = workbook::load(&second).unwrap();
    assert_eq!(a.sheet("DRE"), b.sheet("DRE"));
    assert_eq!(
        a.sheet("Investimentos").unwrap().value(1, 10),
        b.sheet("Investimentos").unwrap().value(1, 10)
    );
}

#[test]
fn test_missing_sheets_fail_without_writing() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("entrada.xlsx");
    let output = dir.path().join("saida.xlsx");
    write_source_workbook(
        &input,
        FixtureOptions {
            sales_only: true,
            ..FixtureOptions::default()
        },
    )
    .unwrap();

    let err = DreGenerator::new(Config::default())
        .run(&input, &output)
        .unwrap_err();
    let missing = err
        .chain()
        .find_map(|cause| match cause.downcast_ref::<DreError>() {
            Some(DreError::MissingSheets(names)) => Some(names.clone()),
            _ => None,
        })
        .expect("missing sheets error in chain");
    assert_eq!(missing, vec!["Custo_Despesas", "Folha"]);
    assert!(!output.exists());
}

#[test]
fn test_explicit_period_with_custom_rates() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("entrada.xlsx");
    write_source_workbook(&input, FixtureOptions::default()).unwrap();

    let config = Config::from_toml_str(
        r#"
        tax_rate = 15
        loss_offset_limit = 30

        [period]
        auto_detect = false
        start = "12/23"
        end = "01/24"
        "#,
    )
    .unwrap();

    let summary = DreGenerator::new(config).run(&input, &input).unwrap();
    assert_eq!(summary.period_source, PeriodSource::Explicit);
    assert_eq!(summary.period.month_count(), 2);
    assert_eq!(summary.depreciation_totals, vec![dec!(0), dec!(0)]);

    let result = workbook::load(&input).unwrap();
    let dre = result.sheet("DRE").unwrap();
    assert_eq!(dre.value(51, 5), formula("=-E49*0.15").as_ref());
    assert!(dre.value(4, 6).is_none());
}
