use crate::kernel::{Kernel, Solid};
use pcbsolid_core::report::{Diagnostic, DiagnosticCode, DiagnosticSink};
use std::slice;

/// Subtract all cutouts from each board in one batched call per board.
///
/// When the batch fails, the cutouts are applied one at a time instead and
/// each one the kernel refuses is reported and left out, so a single bad
/// cutout never costs the board. The result is parallel to `boards`; `None`
/// marks a board body the kernel no longer knows. Cutout solids are released
/// afterwards.
pub fn subtract_cutouts(
    kernel: &mut dyn Kernel,
    boards: &[Solid],
    cutouts: &[Solid],
    sink: &mut dyn DiagnosticSink,
) -> Vec<Option<Solid>> {
    if cutouts.is_empty() {
        return boards.iter().cloned().map(Some).collect();
    }

    let finished = boards
        .iter()
        .enumerate()
        .map(|(i, board)| match kernel.subtract(board, cutouts) {
            Ok(result) => {
                kernel.release(board);
                Some(result)
            }
            Err(err) => {
                tracing::warn!(board = i, %err, "batched subtraction failed, retrying per cutout");
                subtract_each(kernel, i, board, cutouts, sink)
            }
        })
        .collect();

    for cutout in cutouts {
        kernel.release(cutout);
    }
    finished
}

fn subtract_each(
    kernel: &mut dyn Kernel,
    index: usize,
    board: &Solid,
    cutouts: &[Solid],
    sink: &mut dyn DiagnosticSink,
) -> Option<Solid> {
    if let Err(err) = kernel.solid_info(board) {
        sink.report(Diagnostic::new(
            DiagnosticCode::KernelFailure,
            format!("board body {index} is unusable: {err}"),
        ));
        return None;
    }

    let mut current = board.clone();
    for (j, cutout) in cutouts.iter().enumerate() {
        match kernel.subtract(&current, slice::from_ref(cutout)) {
            Ok(next) => {
                kernel.release(&current);
                current = next;
            }
            Err(err) => sink.report(Diagnostic::new(
                DiagnosticCode::KernelFailure,
                format!("cutout {j} left out of board body {index}: {err}"),
            )),
        }
    }
    Some(current)
}
