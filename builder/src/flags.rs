// Licensed under the Apache-2.0 license

use boot_image::BootFlags;

use crate::model::{BootImage, Entitlements, HartId};

/// Folds a payload's entitlements into the per-hart boot flags.
pub fn encode(entitlements: &Entitlements) -> BootFlags {
    let mut flags = BootFlags::empty();
    flags.set(BootFlags::ANCILLARY_DATA, entitlements.ancillary_data);
    flags.set(BootFlags::SKIP_OPENSBI, entitlements.skip_opensbi);
    flags.set(BootFlags::SKIP_AUTOBOOT, entitlements.skip_autoboot);
    flags.set(
        BootFlags::ALLOW_WARM_REBOOT,
        entitlements.allow_warm_reboot || entitlements.allow_cold_reboot,
    );
    flags.set(BootFlags::ALLOW_COLD_REBOOT, entitlements.allow_cold_reboot);
    flags
}

/// Assigns the encoded flags to `owner` and every secondary hart, replacing
/// whatever an earlier payload left there.
pub fn apply(
    image: &mut BootImage,
    entitlements: &Entitlements,
    owner: HartId,
    secondary: &[HartId],
) {
    let flags = encode(entitlements);
    for &hart in std::iter::once(&owner).chain(secondary) {
        image.hart_mut(hart).flags = flags;
    }
}
