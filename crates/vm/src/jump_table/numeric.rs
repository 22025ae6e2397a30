//! Arithmetic handlers over arbitrary-precision integers.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::stack_item::StackItem;
use num_bigint::{BigInt, Sign};
use num_traits::{One, Pow, Signed, Zero};

/// Faults when the value no longer fits the configured integer width.
pub fn check_integer(value: BigInt, max_integer_size: usize) -> VmResult<BigInt> {
    if value.is_zero() {
        return Ok(value);
    }
    if value.to_signed_bytes_le().len() > max_integer_size {
        return Err(VmError::out_of_range(format!(
            "integer overflows {max_integer_size} bytes"
        )));
    }
    Ok(value)
}

fn unary(
    engine: &mut ExecutionEngine,
    op: impl FnOnce(BigInt) -> VmResult<BigInt>,
) -> VmResult<()> {
    let value = engine.pop_integer()?;
    engine.push(StackItem::Integer(op(value)?))
}

fn binary(
    engine: &mut ExecutionEngine,
    op: impl FnOnce(BigInt, BigInt) -> VmResult<BigInt>,
) -> VmResult<()> {
    let right = engine.pop_integer()?;
    let left = engine.pop_integer()?;
    engine.push(StackItem::Integer(op(left, right)?))
}

fn compare(
    engine: &mut ExecutionEngine,
    op: impl FnOnce(&BigInt, &BigInt) -> bool,
) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    let right = engine.pop()?;
    let left = engine.pop()?;
    // A null operand never compares true against a number.
    if left.is_null() || right.is_null() {
        engine.push(StackItem::from_bool(false))?;
        return Ok(());
    }
    let result = op(&left.get_integer(max)?, &right.get_integer(max)?);
    engine.push(StackItem::from_bool(result))
}

pub fn sign(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let value = engine.pop_integer()?;
    let sign = match value.sign() {
        Sign::Minus => -1,
        Sign::NoSign => 0,
        Sign::Plus => 1,
    };
    engine.push(StackItem::from_int(sign))
}

pub fn abs(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    unary(engine, move |v| check_integer(v.abs(), max))
}

pub fn negate(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    unary(engine, move |v| check_integer(-v, max))
}

pub fn inc(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    unary(engine, move |v| check_integer(v + 1, max))
}

pub fn dec(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    unary(engine, move |v| check_integer(v - 1, max))
}

pub fn add(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    binary(engine, move |a, b| check_integer(a + b, max))
}

pub fn sub(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    binary(engine, move |a, b| check_integer(a - b, max))
}

pub fn mul(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    binary(engine, move |a, b| check_integer(a * b, max))
}

pub fn div(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    binary(engine, move |a, b| {
        if b.is_zero() {
            return Err(VmError::DivideByZero);
        }
        // BigInt division truncates toward zero, like the reference.
        check_integer(a / b, max)
    })
}

pub fn modulo(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    binary(engine, move |a, b| {
        if b.is_zero() {
            return Err(VmError::DivideByZero);
        }
        check_integer(a % b, max)
    })
}

pub fn pow(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    binary(engine, move |base, exponent| {
        let exponent: u32 = exponent
            .try_into()
            .map_err(|_| VmError::out_of_range("POW exponent"))?;
        check_integer(Pow::pow(&base, exponent), max)
    })
}

pub fn sqrt(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    unary(engine, |value| {
        if value.is_negative() {
            return Err(VmError::out_of_range("SQRT of a negative number"));
        }
        Ok(integer_sqrt(&value))
    })
}

/// Floor square root by Newton iteration.
fn integer_sqrt(value: &BigInt) -> BigInt {
    if value.is_zero() {
        return BigInt::zero();
    }
    let two = BigInt::from(2);
    let mut x: BigInt = BigInt::one() << ((value.bits() + 1) / 2);
    loop {
        let y = (&x + value / &x) / &two;
        if y >= x {
            return x;
        }
        x = y;
    }
}

pub fn mod_mul(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    let modulus = engine.pop_integer()?;
    let right = engine.pop_integer()?;
    let left = engine.pop_integer()?;
    if modulus.is_zero() {
        return Err(VmError::DivideByZero);
    }
    engine.push(StackItem::Integer(check_integer(left * right % modulus, max)?))
}

pub fn mod_pow(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    let modulus = engine.pop_integer()?;
    let exponent = engine.pop_integer()?;
    let base = engine.pop_integer()?;
    if modulus.is_zero() {
        return Err(VmError::DivideByZero);
    }
    let result = if exponent == BigInt::from(-1) {
        // Exponent -1 requests the modular inverse.
        mod_inverse(&base, &modulus)
            .ok_or_else(|| VmError::invalid_operation("no modular inverse"))?
    } else {
        if exponent.is_negative() {
            return Err(VmError::out_of_range("MODPOW exponent"));
        }
        base.modpow(&exponent, &modulus)
    };
    engine.push(StackItem::Integer(check_integer(result, max)?))
}

/// Extended Euclid; returns x with (value * x) mod modulus == 1.
fn mod_inverse(value: &BigInt, modulus: &BigInt) -> Option<BigInt> {
    let modulus = modulus.abs();
    let mut r = (value % &modulus + &modulus) % &modulus;
    let mut old_r = modulus.clone();
    let mut s = BigInt::one();
    let mut old_s = BigInt::zero();
    while !r.is_zero() {
        let quotient = &old_r / &r;
        let next_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &quotient * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }
    if old_r != BigInt::one() {
        return None; // not coprime
    }
    Some((old_s % &modulus + &modulus) % modulus)
}

pub fn shl(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    let shift = pop_shift(engine)?;
    let value = engine.pop_integer()?;
    if shift == 0 {
        engine.push(StackItem::Integer(value))
    } else {
        engine.push(StackItem::Integer(check_integer(value << shift, max)?))
    }
}

pub fn shr(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let shift = pop_shift(engine)?;
    let value = engine.pop_integer()?;
    engine.push(StackItem::Integer(value >> shift))
}

fn pop_shift(engine: &mut ExecutionEngine) -> VmResult<u32> {
    let max_shift = engine.limits().max_shift;
    let shift: u32 = engine
        .pop_integer()?
        .try_into()
        .map_err(|_| VmError::out_of_range("negative shift"))?;
    if shift > max_shift {
        return Err(VmError::out_of_range(format!("shift {shift} > {max_shift}")));
    }
    Ok(shift)
}

pub fn not(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let value = engine.pop_boolean()?;
    engine.push(StackItem::from_bool(!value))
}

pub fn bool_and(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let right = engine.pop_boolean()?;
    let left = engine.pop_boolean()?;
    engine.push(StackItem::from_bool(left && right))
}

pub fn bool_or(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let right = engine.pop_boolean()?;
    let left = engine.pop_boolean()?;
    engine.push(StackItem::from_bool(left || right))
}

pub fn nz(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let value = engine.pop_integer()?;
    engine.push(StackItem::from_bool(!value.is_zero()))
}

pub fn num_equal(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let right = engine.pop_integer()?;
    let left = engine.pop_integer()?;
    engine.push(StackItem::from_bool(left == right))
}

pub fn num_not_equal(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let right = engine.pop_integer()?;
    let left = engine.pop_integer()?;
    engine.push(StackItem::from_bool(left != right))
}

pub fn lt(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    compare(engine, |a, b| a < b)
}

pub fn le(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    compare(engine, |a, b| a <= b)
}

pub fn gt(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    compare(engine, |a, b| a > b)
}

pub fn ge(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    compare(engine, |a, b| a >= b)
}

pub fn min(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    binary(engine, |a, b| Ok(a.min(b)))
}

pub fn max(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    binary(engine, |a, b| Ok(a.max(b)))
}

pub fn within(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let upper = engine.pop_integer()?;
    let lower = engine.pop_integer()?;
    let value = engine.pop_integer()?;
    engine.push(StackItem::from_bool(lower <= value && value < upper))
}
