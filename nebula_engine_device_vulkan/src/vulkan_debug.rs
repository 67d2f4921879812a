/// Vulkan debug messenger - routes validation layer messages into the
/// engine logger
///
/// Compiled only with the `vulkan-validation` feature. The messenger
/// forwards validation/performance messages at the matching engine log
/// severity, so validation output interleaves with regular engine logs.

use std::ffi::CStr;

use ash::vk;

use nebula_engine::{engine_debug, engine_error, engine_warn};

/// Vulkan debug messenger callback
///
/// Called by the validation layers; never aborts Vulkan execution.
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = *p_callback_data;
    let message = if callback_data.p_message.is_null() {
        "No message"
    } else {
        CStr::from_ptr(callback_data.p_message)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };

    let type_str = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        engine_error!("nebula::vulkan::debug", "[{}] {}", type_str, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        engine_warn!("nebula::vulkan::debug", "[{}] {}", type_str, message);
    } else {
        engine_debug!("nebula::vulkan::debug", "[{}] {}", type_str, message);
    }

    vk::FALSE
}

/// Create the debug messenger for an instance with validation enabled
pub(crate) fn create_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Result<
    (ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT),
    vk::Result,
> {
    let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

    let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&debug_info, None)? };
    Ok((debug_utils, messenger))
}
