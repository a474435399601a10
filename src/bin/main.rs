// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use bond_ledger_rs::fixed_point::to_decimal;
use bond_ledger_rs::{
    AccountId, Amount, BondError, BondLedger, BondTerms, Clock, CouponIndex, Currency,
    InMemoryCurrency, ManualClock, Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound on coupon periods a single `claim_coupons` row scans.
const MAX_COUPON_SCAN: u32 = 400;

/// Bond Ledger - Replay a bond lifecycle from a CSV file
///
/// Reads lifecycle operations from a CSV file, applies them to a single bond
/// and writes holder positions (or a JSON snapshot) to stdout. Logs go to
/// stderr; set RUST_LOG to adjust verbosity.
#[derive(Parser, Debug)]
#[command(name = "bond-ledger")]
#[command(about = "Replays bond lifecycle operations from a CSV file", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,caller,counterparty,index,amount,time
    /// Example: cargo run -- operations.csv > holders.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// JSON file with bond terms; overrides the individual term flags
    #[arg(long, value_name = "JSON")]
    terms: Option<PathBuf>,

    #[arg(long, default_value = "Bond")]
    name: String,

    #[arg(long, default_value = "BOND")]
    symbol: String,

    #[arg(long, default_value_t = 0)]
    issuer: u32,

    /// Face value of one whole bond, in the currency's smallest unit
    #[arg(long, default_value_t = 100)]
    notional: Amount,

    /// Annual coupon rate in basis points
    #[arg(long, default_value_t = 400)]
    apr_bps: u32,

    #[arg(long, default_value_t = 90 * 86_400)]
    frequency_secs: u64,

    /// Maturity as seconds since the epoch
    #[arg(long, default_value_t = 360 * 86_400)]
    maturity: u64,

    /// Maximum total subscription, in the currency's smallest unit
    #[arg(long, default_value_t = 1_000_000)]
    cap: Amount,

    /// Bond-unit decimals
    #[arg(long, default_value_t = 0)]
    decimals: u8,

    /// Currency decimals, used only to render amounts
    #[arg(long, default_value_t = 0)]
    currency_decimals: u8,

    /// The ledger's own account on the currency
    #[arg(long, default_value_t = u32::MAX)]
    escrow: u32,

    /// Clock value before the first row, as seconds since the epoch
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Emit a JSON snapshot of the bond instead of holder positions
    #[arg(long)]
    summary: bool,
}

impl Args {
    fn bond_terms(&self) -> Result<BondTerms, CliError> {
        if let Some(path) = &self.terms {
            let file = File::open(path)?;
            return Ok(serde_json::from_reader(BufReader::new(file))?);
        }
        Ok(BondTerms {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            issuer: AccountId(self.issuer),
            notional: self.notional,
            apr_basis_points: self.apr_bps,
            coupon_frequency_secs: self.frequency_secs,
            maturity: Timestamp(self.maturity),
            cap: self.cap,
            decimals: self.decimals,
        })
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid terms file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Bond(#[from] BondError),
    #[error("amount {0} cannot be rendered as a decimal")]
    Unrepresentable(Amount),
}

fn main() {
    init_tracing();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("{e}");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    // A second init (tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn run(args: &Args) -> Result<(), CliError> {
    let terms = args.bond_terms()?;
    let file = File::open(&args.input)?;
    let replay = process_operations(
        BufReader::new(file),
        terms,
        AccountId(args.escrow),
        Timestamp(args.start),
    )?;

    let stdout = std::io::stdout();
    if args.summary {
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &replay.ledger.snapshot())?;
        writeln!(out)?;
    } else {
        write_holders(&replay, args.currency_decimals, stdout.lock())?;
    }
    Ok(())
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, caller, counterparty, index, amount, time`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    caller: u32,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    counterparty: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    index: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Amount>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    time: Option<u64>,
}

/// One replayable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    /// Credits currency to an account, outside the bond.
    Mint { account: AccountId, amount: Amount },
    /// Lets the escrow pull up to `amount` from `owner`.
    Approve { owner: AccountId, amount: Amount },
    Subscribe { investor: AccountId, amount: Amount },
    Close { caller: AccountId },
    Withdraw { caller: AccountId },
    ClaimBond { investor: AccountId },
    DepositCoupon { caller: AccountId, index: CouponIndex, amount: Amount },
    ClaimCoupon { investor: AccountId, index: CouponIndex },
    ClaimCoupons { investor: AccountId },
    CheckDefault { index: CouponIndex },
    ReturnPrincipal { caller: AccountId, amount: Amount },
    Redeem { investor: AccountId },
    Transfer { from: AccountId, to: AccountId, units: Amount },
}

impl CsvRecord {
    /// Converts CSV record to an [`Op`].
    ///
    /// Returns `None` for unknown ops or missing required fields.
    fn into_op(self) -> Option<Op> {
        let caller = AccountId(self.caller);
        let index = self.index.map(CouponIndex);

        match self.op.to_lowercase().as_str() {
            "mint" => Some(Op::Mint {
                account: caller,
                amount: self.amount?,
            }),
            "approve" => Some(Op::Approve {
                owner: caller,
                amount: self.amount?,
            }),
            "subscribe" => Some(Op::Subscribe {
                investor: caller,
                amount: self.amount?,
            }),
            "close" => Some(Op::Close { caller }),
            "withdraw" => Some(Op::Withdraw { caller }),
            "claim_bond" => Some(Op::ClaimBond { investor: caller }),
            "deposit_coupon" => Some(Op::DepositCoupon {
                caller,
                index: index?,
                amount: self.amount?,
            }),
            "claim_coupon" => Some(Op::ClaimCoupon {
                investor: caller,
                index: index?,
            }),
            "claim_coupons" => Some(Op::ClaimCoupons { investor: caller }),
            "check_default" => Some(Op::CheckDefault { index: index? }),
            "return_principal" => Some(Op::ReturnPrincipal {
                caller,
                amount: self.amount?,
            }),
            "redeem" => Some(Op::Redeem { investor: caller }),
            "transfer" => Some(Op::Transfer {
                from: caller,
                to: AccountId(self.counterparty?),
                units: self.amount?,
            }),
            _ => None,
        }
    }
}

/// A bond with the currency and clock it was replayed against.
struct Replay {
    ledger: BondLedger,
    currency: Arc<InMemoryCurrency>,
    clock: Arc<ManualClock>,
}

impl Replay {
    fn new(terms: BondTerms, escrow: AccountId, start: Timestamp) -> Result<Self, BondError> {
        let currency = Arc::new(InMemoryCurrency::new());
        let clock = Arc::new(ManualClock::new(start));
        let ledger = BondLedger::new(escrow, terms, currency.clone(), clock.clone())?;
        Ok(Self {
            ledger,
            currency,
            clock,
        })
    }

    fn apply(&self, op: Op) -> Result<(), BondError> {
        let ledger = &self.ledger;
        match op {
            Op::Mint { account, amount } => self.currency.mint(account, amount),
            Op::Approve { owner, amount } => self.currency.approve(owner, ledger.escrow(), amount),
            Op::Subscribe { investor, amount } => ledger.subscribe(investor, amount)?,
            Op::Close { caller } => {
                ledger.close_primary_issuance(caller)?;
            }
            Op::Withdraw { caller } => {
                ledger.withdraw_proceeds(caller)?;
            }
            Op::ClaimBond { investor } => {
                ledger.claim_bond(investor)?;
            }
            Op::DepositCoupon {
                caller,
                index,
                amount,
            } => ledger.deposit_coupon(caller, index, amount)?,
            Op::ClaimCoupon { investor, index } => {
                ledger.claim_coupon(investor, index)?;
            }
            Op::ClaimCoupons { investor } => {
                let total = self.claim_due_coupons(investor);
                info!(%investor, total, "due coupons claimed");
            }
            Op::CheckDefault { index } => {
                ledger.check_default(index)?;
            }
            Op::ReturnPrincipal { caller, amount } => ledger.return_principal(caller, amount)?,
            Op::Redeem { investor } => {
                ledger.redeem(investor)?;
            }
            Op::Transfer { from, to, units } => ledger.transfer_units(from, to, units)?,
        }
        Ok(())
    }

    /// Claims every funded, already-due coupon `investor` still has unpaid
    /// units in,
    /// scanning from index 1 and stopping at the first date still ahead.
    ///
    /// Returns the total paid out.
    fn claim_due_coupons(&self, investor: AccountId) -> Amount {
        let now = self.clock.now();
        let last = self.ledger.coupon_count().min(MAX_COUPON_SCAN);
        let mut total: Amount = 0;
        for index in (1..=last).map(CouponIndex) {
            let Some(due) = self.ledger.coupon_date(index) else {
                break;
            };
            if due > now {
                break;
            }
            if !self.ledger.coupon_funded(index) {
                continue;
            }
            match self.ledger.claim_coupon(investor, index) {
                Ok(payout) => total = total.saturating_add(payout),
                Err(e @ BondError::CouponAlreadyClaimed { .. }) => {
                    debug!(%investor, %index, "coupon skipped: {e}")
                }
                Err(e) => warn!(%investor, %index, "coupon skipped: {e}"),
            }
        }
        total
    }
}

/// Replays operations from a CSV reader against a fresh bond.
///
/// Rows are streamed; malformed rows and rejected operations are logged and
/// skipped.
///
/// # CSV Format
///
/// Expected columns: `op, caller, counterparty, index, amount, time`
/// - `op`: one of mint, approve, subscribe, close, withdraw, claim_bond,
///   deposit_coupon, claim_coupon, claim_coupons, check_default,
///   return_principal, redeem, transfer
/// - `caller`: acting account
/// - `counterparty`: recipient of a unit transfer
/// - `index`: coupon index (1-based)
/// - `amount`: raw integer amount
/// - `time`: if present, the clock moves to this instant before the row runs
///
/// # Example
///
/// ```csv
/// op,caller,counterparty,index,amount,time
/// mint,1,,,1000,
/// approve,1,,,1000,
/// subscribe,1,,,1000,10
/// close,0,,,,20
/// ```
///
/// # Errors
///
/// Returns an error if the terms are invalid or the CSV structure is.
fn process_operations<R: Read>(
    reader: R,
    terms: BondTerms,
    escrow: AccountId,
    start: Timestamp,
) -> Result<Replay, CliError> {
    let replay = Replay::new(terms, escrow, start)?;

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (row, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row, "skipping malformed row: {e}");
                continue;
            }
        };
        if let Some(time) = record.time {
            let to = Timestamp(time);
            if to < replay.clock.now() {
                warn!(row, %to, "clock cannot move backwards, keeping current time");
            }
            replay.clock.set(to);
        }
        let Some(op) = record.into_op() else {
            warn!(row, "skipping unknown or incomplete operation");
            continue;
        };
        debug!(row, ?op, "applying");
        if let Err(e) = replay.apply(op) {
            warn!(row, ?op, kind = ?e.kind(), "operation rejected: {e}");
        }
    }

    Ok(replay)
}

/// One output row per investor.
#[derive(Debug, Serialize)]
struct HolderRow {
    investor: AccountId,
    receipt: Decimal,
    units: Decimal,
    currency_balance: Decimal,
    accrued_interest: Decimal,
}

fn render(raw: Amount, decimals: u8) -> Result<Decimal, CliError> {
    to_decimal(raw, decimals).ok_or(CliError::Unrepresentable(raw))
}

/// Write holder positions to a CSV writer.
///
/// # CSV Format
///
/// Columns: `investor, receipt, units, currency_balance, accrued_interest`
///
/// # Errors
///
/// Returns an error if writing fails or an amount cannot be rendered.
fn write_holders<W: Write>(
    replay: &Replay,
    currency_decimals: u8,
    writer: W,
) -> Result<(), CliError> {
    let ledger = &replay.ledger;
    let unit_decimals = ledger.terms().decimals;
    let mut wtr = Writer::from_writer(writer);

    for position in ledger.positions() {
        let interest = ledger.accrued_interest(position.investor)?;
        wtr.serialize(HolderRow {
            investor: position.investor,
            receipt: render(position.receipt, currency_decimals)?,
            units: render(position.units, unit_decimals)?,
            currency_balance: render(
                replay.currency.balance_of(position.investor),
                currency_decimals,
            )?,
            accrued_interest: render(interest, currency_decimals)?,
        })?;
    }

    wtr.flush()?;
    Ok(())
}
